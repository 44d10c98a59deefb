//! Turns a stream of content deltas into a stream of instances.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::json::{extract_json, parse_partial};
use crate::schema::{TargetSchema, ITERABLE_KEY};

/// Incremental consumer of streamed model text.
pub trait Accumulator: Send {
    /// Feeds one delta, returning the instances that became available.
    fn push(&mut self, delta: &str) -> Vec<Result<Value>>;

    /// Called once the upstream stream ended normally.
    fn finish(&mut self) -> Vec<Result<Value>>;
}

/// Emits progressively more complete instances of a single object.
pub struct PartialAccumulator {
    target: Arc<dyn TargetSchema>,
    buffer: String,
    last: Option<Value>,
}

impl PartialAccumulator {
    pub fn new(target: Arc<dyn TargetSchema>) -> Self {
        Self {
            target,
            buffer: String::new(),
            last: None,
        }
    }
}

impl Accumulator for PartialAccumulator {
    fn push(&mut self, delta: &str) -> Vec<Result<Value>> {
        self.buffer.push_str(delta);
        let Some(parsed) = parse_partial(&self.buffer) else {
            return Vec::new();
        };
        let projected = self.target.partial(&parsed);
        if self.last.as_ref() == Some(&projected) {
            return Vec::new();
        }
        self.last = Some(projected.clone());
        vec![Ok(projected)]
    }

    fn finish(&mut self) -> Vec<Result<Value>> {
        let complete = match serde_json::from_str::<Value>(extract_json(&self.buffer)) {
            Ok(value) => value,
            Err(err) => return vec![Err(ClientError::Json(err))],
        };
        let validated = match self.target.validate(&complete) {
            Ok(value) => value,
            Err(source) => {
                return vec![Err(ClientError::InvalidOutput {
                    target: self.target.name().to_string(),
                    source,
                })]
            }
        };
        if self.last.as_ref() == Some(&validated) {
            return Vec::new();
        }
        self.last = Some(validated.clone());
        vec![Ok(validated)]
    }
}

/// Emits each element of a streamed `{"tasks": [...]}` document once it is
/// complete.
pub struct IterableAccumulator {
    target: Arc<dyn TargetSchema>,
    buffer: String,
    emitted: usize,
}

impl IterableAccumulator {
    pub fn new(target: Arc<dyn TargetSchema>) -> Self {
        Self {
            target,
            buffer: String::new(),
            emitted: 0,
        }
    }

    fn emit_until(&mut self, tasks: &[Value], end: usize) -> Vec<Result<Value>> {
        let mut out = Vec::new();
        while self.emitted < end {
            let item = &tasks[self.emitted];
            self.emitted += 1;
            match self.target.validate(item) {
                Ok(value) => out.push(Ok(value)),
                Err(source) => {
                    out.push(Err(ClientError::InvalidOutput {
                        target: self.target.name().to_string(),
                        source,
                    }));
                    break;
                }
            }
        }
        out
    }
}

impl Accumulator for IterableAccumulator {
    fn push(&mut self, delta: &str) -> Vec<Result<Value>> {
        self.buffer.push_str(delta);
        let Some(parsed) = parse_partial(&self.buffer) else {
            return Vec::new();
        };
        let Some(tasks) = parsed.get(ITERABLE_KEY).and_then(Value::as_array) else {
            return Vec::new();
        };
        // Only elements followed by another one are known to be complete.
        let complete = tasks.len().saturating_sub(1);
        self.emit_until(tasks, complete)
    }

    fn finish(&mut self) -> Vec<Result<Value>> {
        let document = match serde_json::from_str::<Value>(extract_json(&self.buffer)) {
            Ok(value) => value,
            Err(err) => return vec![Err(ClientError::Json(err))],
        };
        let tasks = match iterable_items(&document) {
            Ok(tasks) => tasks,
            Err(err) => return vec![Err(err)],
        };
        let total = tasks.len();
        self.emit_until(tasks, total)
    }
}

/// Elements of a `{"tasks": [...]}` document.
pub fn iterable_items(document: &Value) -> Result<&Vec<Value>> {
    document
        .get(ITERABLE_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::Stream(format!("response has no `{ITERABLE_KEY}` array")))
}

struct AccumulateState<A> {
    deltas: BoxStream<'static, Result<String>>,
    accumulator: A,
    pending: VecDeque<Result<Value>>,
    finished: bool,
}

/// Drives an [`Accumulator`] over a delta stream.
///
/// The output ends after the first error; nothing is produced after a failure.
pub fn accumulate<A>(
    deltas: BoxStream<'static, Result<String>>,
    accumulator: A,
) -> BoxStream<'static, Result<Value>>
where
    A: Accumulator + 'static,
{
    let state = AccumulateState {
        deltas,
        accumulator,
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.deltas.next().await {
                Some(Ok(delta)) => {
                    let items = state.accumulator.push(&delta);
                    state.pending.extend(items);
                }
                Some(Err(err)) => {
                    debug!(error = %err, "delta stream failed");
                    state.finished = true;
                    state.pending.push_back(Err(err));
                }
                None => {
                    state.finished = true;
                    let items = state.accumulator.finish();
                    state.pending.extend(items);
                }
            }
        }
    })
    .boxed()
}
