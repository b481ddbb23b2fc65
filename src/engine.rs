use std::sync::{Arc, OnceLock};

use crate::Error;
use crate::cache::{CacheStats, CompileCache};
use crate::trace::{TraceEvent, TraceSink, Tracer};
use crate::types::{CompiledExpression, Record, RecordSchema};

/// Compiles expressions against record schemas and evaluates them, caching
/// each compiled form under its `(schema fingerprint, expression text)` key.
///
/// An engine is `Send + Sync`; share one across threads by reference or
/// `Arc`. [`Engine::global()`] returns a process-wide instance whose cache
/// lives until [`clear_cache()`](Self::clear_cache) is called.
///
/// # Example
///
/// ```
/// use ooroo_expr::{Engine, RecordSchema, RecordValue, Schema};
///
/// let schema = RecordSchema::new()
///     .field("symbol", Schema::STR)
///     .field("price", Schema::F64);
/// let trade = RecordValue::new().set("symbol", "IBM").set("price", 150.0_f64);
///
/// let engine = Engine::new();
/// assert!(engine.eval(r#"symbol == "IBM" && price > 140.5"#, &trade, &schema).unwrap());
/// assert_eq!(engine.cache_stats().entries, 1);
/// ```
#[derive(Default)]
pub struct Engine {
    cache: CompileCache,
}

static GLOBAL: OnceLock<Engine> = OnceLock::new();

impl Engine {
    /// An engine with its own, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: CompileCache::new(),
        }
    }

    /// The process-wide engine used by [`crate::eval()`].
    pub fn global() -> &'static Engine {
        GLOBAL.get_or_init(Engine::new)
    }

    /// Compile `expr` for `schema`, or return the cached form.
    ///
    /// # Errors
    ///
    /// Returns a lex, parse, resolve, or type-check [`Error`]. Failed
    /// compilations are not cached.
    pub fn compile(&self, expr: &str, schema: &RecordSchema) -> Result<Arc<CompiledExpression>, Error> {
        self.compile_with(expr, schema, &mut Tracer::off())
    }

    /// Compile (or fetch) `expr` and evaluate it against `record`.
    ///
    /// # Errors
    ///
    /// Returns the compile error, or the evaluation error of the first
    /// subexpression in source order that failed.
    pub fn eval(&self, expr: &str, record: &dyn Record, schema: &RecordSchema) -> Result<bool, Error> {
        self.run(expr, record, schema, Tracer::off())
    }

    /// Like [`eval()`](Self::eval), reporting each step to `sink`.
    ///
    /// # Errors
    ///
    /// Same as [`eval()`](Self::eval).
    pub fn eval_traced(
        &self,
        expr: &str,
        record: &dyn Record,
        schema: &RecordSchema,
        sink: &mut dyn TraceSink,
    ) -> Result<bool, Error> {
        self.run(expr, record, schema, Tracer::new(Some(sink)))
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached expression and reset the counters. Compiled forms
    /// already handed out stay valid.
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!("compile cache cleared");
    }

    /// Publish a previously compiled expression (for example one decoded with
    /// [`CompiledExpression::from_bytes()`]) under its text and fingerprint.
    ///
    /// Returns `false` and keeps the existing entry if the key is already
    /// cached.
    #[cfg(feature = "binary-cache")]
    pub fn preload(&self, compiled: CompiledExpression) -> bool {
        self.cache.preload(compiled)
    }

    fn run(
        &self,
        expr: &str,
        record: &dyn Record,
        schema: &RecordSchema,
        mut tracer: Tracer<'_>,
    ) -> Result<bool, Error> {
        let compiled = self.compile_with(expr, schema, &mut tracer)?;
        crate::evaluate::evaluate(&compiled, record, &mut tracer)
    }

    fn compile_with(
        &self,
        expr: &str,
        schema: &RecordSchema,
        tracer: &mut Tracer<'_>,
    ) -> Result<Arc<CompiledExpression>, Error> {
        let fingerprint = schema.fingerprint();
        tracer.emit(|| TraceEvent::SchemaFingerprint {
            digest: fingerprint.digest(),
        });

        if let Some(compiled) = self.cache.lookup(expr, fingerprint) {
            tracer.emit(|| TraceEvent::CacheLookup { hit: true });
            return Ok(compiled);
        }
        tracer.emit(|| TraceEvent::CacheLookup { hit: false });

        let (compiled, published) = self
            .cache
            .get_or_compile(expr, fingerprint, || crate::compile::compile(expr, schema, tracer))?;
        if published {
            tracer.emit(|| TraceEvent::CachePublished {
                subexprs: compiled.subexprs().len(),
            });
        }
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordValue, Schema};
    use crate::{ErrorCode, RecordingSink};

    fn schema() -> RecordSchema {
        RecordSchema::new()
            .field("a", Schema::I32)
            .field("b", Schema::I32)
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn compile_returns_shared_form() {
        let engine = Engine::new();
        let first = engine.compile("a == 1", &schema()).unwrap();
        let second = engine.compile("a == 1", &schema()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let stats = engine.cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn compile_errors_are_returned_and_not_cached() {
        let engine = Engine::new();
        let err = engine.compile("a == 1 &&", &schema()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseMissingOperand);
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn eval_errors_keep_the_entry() {
        let engine = Engine::new();
        let record = RecordValue::new().set("a", i32::MAX).set("b", 0_i32);
        let err = engine.eval("a + 1 > 0", &record, &schema()).unwrap_err();
        assert_eq!(err, Error::ArithmeticOverflow { se: 1 });
        assert_eq!(engine.cache_stats().entries, 1);

        let record = RecordValue::new().set("a", 1_i32).set("b", 0_i32);
        assert_eq!(engine.eval("a + 1 > 0", &record, &schema()), Ok(true));
        assert_eq!(engine.cache_stats().misses, 1);
    }

    #[test]
    fn trace_on_miss_then_hit() {
        let engine = Engine::new();
        let record = RecordValue::new().set("a", 1_i32).set("b", 2_i32);

        let mut cold = RecordingSink::new();
        assert_eq!(
            engine.eval_traced("a == 1 && b == 2", &record, &schema(), &mut cold),
            Ok(true)
        );
        assert_eq!(cold.cache_hit(), Some(false));
        assert!(matches!(cold.events()[0], TraceEvent::SchemaFingerprint { .. }));
        assert!(cold.events().iter().any(|e| matches!(e, TraceEvent::Token { .. })));
        assert!(
            cold.events()
                .contains(&TraceEvent::CachePublished { subexprs: 2 })
        );

        let mut warm = RecordingSink::new();
        engine
            .eval_traced("a == 1 && b == 2", &record, &schema(), &mut warm)
            .unwrap();
        assert_eq!(warm.cache_hit(), Some(true));
        assert!(!warm.events().iter().any(|e| matches!(e, TraceEvent::Token { .. })));
        assert_eq!(warm.evaluated(), vec![1, 2]);
        assert_eq!(warm.events().last(), Some(&TraceEvent::Outcome { result: true }));
    }

    #[test]
    fn clear_cache_forces_recompile() {
        let engine = Engine::new();
        let held = engine.compile("b >= 0", &schema()).unwrap();
        engine.clear_cache();
        assert_eq!(engine.cache_stats().entries, 0);
        let fresh = engine.compile("b >= 0", &schema()).unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
        assert_eq!(*held, *fresh);
    }
}
