//! Structured trace of compilation and evaluation steps.
//!
//! Tracing is off unless the caller attaches a [`TraceSink`]. Events are
//! built lazily, so an untraced call pays nothing for them. Attaching a sink
//! never changes the outcome of a call or the state of the compile cache.

use crate::types::Connective;

/// A named point in the compile/evaluate pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// Result of consulting the compile cache.
    CacheLookup { hit: bool },
    /// Short digest of the schema fingerprint used as the cache key.
    SchemaFingerprint { digest: String },
    /// One lexed token (cache misses only).
    Token { offset: usize, text: String },
    /// A subexpression was resolved and type-checked (cache misses only).
    SubexprFormed { id: u32, description: String },
    /// A freshly compiled expression was published to the cache.
    CachePublished { subexprs: usize },
    /// One subexpression was evaluated.
    SubexprEvaluated {
        id: u32,
        lhs: String,
        rhs: String,
        result: bool,
    },
    /// A group of the parenthesization tree produced its value.
    GroupCombined {
        connective: Option<Connective>,
        result: bool,
        short_circuited: bool,
    },
    /// Final boolean of the call.
    Outcome { result: bool },
}

/// Receiver for [`TraceEvent`]s.
pub trait TraceSink {
    fn event(&mut self, event: TraceEvent);
}

/// Collects every event in memory.
///
/// # Example
///
/// ```
/// use ooroo_expr::{Engine, RecordSchema, RecordValue, RecordingSink, Schema};
///
/// let schema = RecordSchema::new().field("a", Schema::I32).field("b", Schema::I32);
/// let record = RecordValue::new().set("a", 0_i32).set("b", 2_i32);
///
/// let mut sink = RecordingSink::new();
/// let result = Engine::new()
///     .eval_traced("a == 1 && b == 2", &record, &schema, &mut sink)
///     .unwrap();
/// assert!(!result);
/// assert_eq!(sink.evaluated(), vec![1]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<TraceEvent>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    /// Ids of the subexpressions that were evaluated, in order.
    #[must_use]
    pub fn evaluated(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::SubexprEvaluated { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// The cache lookup result, if one was recorded.
    #[must_use]
    pub fn cache_hit(&self) -> Option<bool> {
        self.events.iter().find_map(|e| match e {
            TraceEvent::CacheLookup { hit } => Some(*hit),
            _ => None,
        })
    }
}

impl TraceSink for RecordingSink {
    fn event(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

/// Forwards events to the `tracing` crate at TRACE level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn event(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::CacheLookup { hit } => tracing::trace!(hit, "cache lookup"),
            TraceEvent::SchemaFingerprint { digest } => {
                tracing::trace!(%digest, "schema fingerprint");
            }
            TraceEvent::Token { offset, text } => tracing::trace!(offset, %text, "token"),
            TraceEvent::SubexprFormed { id, description } => {
                tracing::trace!(id, %description, "subexpression formed");
            }
            TraceEvent::CachePublished { subexprs } => {
                tracing::trace!(subexprs, "compiled expression published");
            }
            TraceEvent::SubexprEvaluated {
                id,
                lhs,
                rhs,
                result,
            } => tracing::trace!(id, %lhs, %rhs, result, "subexpression evaluated"),
            TraceEvent::GroupCombined {
                connective,
                result,
                short_circuited,
            } => tracing::trace!(
                connective = ?connective,
                result,
                short_circuited,
                "group combined"
            ),
            TraceEvent::Outcome { result } => tracing::trace!(result, "outcome"),
        }
    }
}

/// Optional sink threaded through one call.
pub(crate) struct Tracer<'a> {
    sink: Option<&'a mut dyn TraceSink>,
}

impl<'a> Tracer<'a> {
    pub(crate) fn off() -> Self {
        Self { sink: None }
    }

    pub(crate) fn new(sink: Option<&'a mut dyn TraceSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&mut self, event: impl FnOnce() -> TraceEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink.event(event());
        }
    }
}
