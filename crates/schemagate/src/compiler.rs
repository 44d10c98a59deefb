//! Turns validated config documents into the route table served over HTTP.
//!
//! Every document yields four routes sharing one [`CompiledEndpoint`]. The
//! endpoint is built once per document and owned by its routes, so each
//! route always answers with its own document's schemas, prompt and model.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use common::{
    synthesize, ConfigDocument, ModelType, PromptRenderer, SchemaRole, ValidationError,
};
use extractllm::TargetSchema;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// One output instance.
    Single,
    /// All output instances, buffered into a JSON array.
    List,
    /// Output instances as server-sent events, as they complete.
    ListStream,
    /// Partial output instances as server-sent events.
    Stream,
}

impl RouteKind {
    pub const ALL: [RouteKind; 4] = [
        RouteKind::Single,
        RouteKind::List,
        RouteKind::ListStream,
        RouteKind::Stream,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            RouteKind::Single => "",
            RouteKind::List => "/list",
            RouteKind::ListStream => "/list/stream",
            RouteKind::Stream => "/stream",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Single => "single",
            RouteKind::List => "list",
            RouteKind::ListStream => "list_stream",
            RouteKind::Stream => "stream",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, RouteKind::ListStream | RouteKind::Stream)
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("route {route} is declared by both {existing} and {incoming}")]
    Conflict {
        route: String,
        existing: String,
        incoming: String,
    },

    #[error("cannot build the {role:?} model of {document}: {source}")]
    Model {
        document: String,
        role: SchemaRole,
        #[source]
        source: ValidationError,
    },
}

/// Everything a request against one config document needs.
#[derive(Debug)]
pub struct CompiledEndpoint {
    document: ConfigDocument,
    input_model: ModelType,
    output_model: Arc<ModelType>,
}

impl CompiledEndpoint {
    pub fn new(document: ConfigDocument) -> Result<Self, CompileError> {
        let model_error = |role| {
            let document = document.path().to_string();
            move |source| CompileError::Model {
                document,
                role,
                source,
            }
        };
        let input_model = synthesize(document.input_schema(), SchemaRole::Input)
            .map_err(model_error(SchemaRole::Input))?;
        let output_model = synthesize(document.output_schema(), SchemaRole::Output)
            .map_err(model_error(SchemaRole::Output))?;

        Ok(Self {
            document,
            input_model,
            output_model: Arc::new(output_model),
        })
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn model(&self) -> &str {
        self.document.model()
    }

    pub fn input_model(&self) -> &ModelType {
        &self.input_model
    }

    pub fn output_model(&self) -> &ModelType {
        &self.output_model
    }

    /// The output model as handed to the model-call client.
    pub fn target(&self) -> Arc<dyn TargetSchema> {
        self.output_model.clone()
    }

    /// Prompt templates, compiled when the document was loaded.
    pub fn renderer(&self) -> &PromptRenderer {
        self.document.renderer()
    }
}

#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub path: String,
    pub kind: RouteKind,
    pub endpoint: Arc<CompiledEndpoint>,
}

/// Immutable mapping from route path to its definition.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, RouteDefinition>,
}

impl RouteTable {
    pub fn get(&self, path: &str) -> Option<&RouteDefinition> {
        self.routes.get(path)
    }

    /// Routes ordered by path.
    pub fn iter(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Compiles every document into four routes. Two documents claiming the
/// same route path abort compilation.
pub fn compile<I>(documents: I) -> Result<RouteTable, CompileError>
where
    I: IntoIterator<Item = ConfigDocument>,
{
    let mut routes = BTreeMap::new();
    for document in documents {
        let endpoint = Arc::new(CompiledEndpoint::new(document)?);
        for kind in RouteKind::ALL {
            let path = format!("{}{}", endpoint.document().path(), kind.suffix());
            match routes.entry(path) {
                Entry::Occupied(existing) => {
                    let existing: &RouteDefinition = existing.get();
                    return Err(CompileError::Conflict {
                        route: existing.path.clone(),
                        existing: existing.endpoint.document().path().to_string(),
                        incoming: endpoint.document().path().to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    let path = slot.key().clone();
                    slot.insert(RouteDefinition {
                        path,
                        kind,
                        endpoint: Arc::clone(&endpoint),
                    });
                }
            }
        }
        info!(
            path = %endpoint.document().path(),
            model = %endpoint.model(),
            output = %endpoint.output_model().name(),
            "compiled endpoint"
        );
    }
    Ok(RouteTable { routes })
}
