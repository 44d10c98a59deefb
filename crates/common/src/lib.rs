pub mod configuration;
pub mod errors;
pub mod field_type;
pub mod loader;
pub mod model;
pub mod prompt;
pub mod schema;

pub use configuration::{ConfigDocument, PromptMessageTemplate, DEFAULT_MODEL};
pub use errors::{ConfigError, FieldError, RenderError, RequestValidationError, ValidationError};
pub use field_type::{resolve, ConcreteType, FieldTypeTag, ScalarType};
pub use loader::ConfigLoader;
pub use model::{synthesize, ModelInstance, ModelType};
pub use prompt::PromptRenderer;
pub use schema::{FieldDescriptor, SchemaDescriptor, SchemaRole};
