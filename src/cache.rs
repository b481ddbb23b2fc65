//! Compile cache keyed by schema fingerprint, then expression text.
//!
//! Each key owns a [`Slot`]. The first caller for a key compiles under the
//! slot's mutex and publishes into its `OnceLock`; concurrent callers for the
//! same key wait on that mutex and then read the published value, so an
//! expression is compiled at most once per schema shape. Failed compilations
//! publish nothing and leave no entry behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use crate::Error;
use crate::types::{CompiledExpression, Fingerprint};

/// Point-in-time counters for an engine's compile cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Lookups that had to compile.
    pub misses: usize,
    /// Published entries.
    pub entries: usize,
}

#[derive(Default)]
struct Slot {
    value: OnceLock<Arc<CompiledExpression>>,
    compiling: Mutex<()>,
}

type Slots = HashMap<Fingerprint, HashMap<String, Arc<Slot>>>;

#[derive(Default)]
pub(crate) struct CompileCache {
    slots: RwLock<Slots>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CompileCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Published entry for `(fingerprint, expr)`, if any.
    pub(crate) fn lookup(&self, expr: &str, fingerprint: &Fingerprint) -> Option<Arc<CompiledExpression>> {
        let found = self
            .read()
            .get(fingerprint)
            .and_then(|by_expr| by_expr.get(expr))
            .and_then(|slot| slot.value.get().cloned());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(expr, schema = %fingerprint, "compile cache hit");
        }
        found
    }

    /// Return the published entry for the key, compiling it with `compile`
    /// if nobody has yet. The flag is `true` when this call published.
    pub(crate) fn get_or_compile<F>(
        &self,
        expr: &str,
        fingerprint: &Fingerprint,
        compile: F,
    ) -> Result<(Arc<CompiledExpression>, bool), Error>
    where
        F: FnOnce() -> Result<CompiledExpression, Error>,
    {
        let slot = self.slot(expr, fingerprint);
        let _guard = slot.compiling.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = slot.value.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(expr, schema = %fingerprint, "compile cache hit after wait");
            return Ok((Arc::clone(existing), false));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(expr, schema = %fingerprint, "compile cache miss");

        match compile() {
            Ok(compiled) => {
                let mut published = false;
                let value = slot.value.get_or_init(|| {
                    published = true;
                    Arc::new(compiled)
                });
                if published {
                    tracing::debug!(
                        expr,
                        schema = %fingerprint,
                        subexprs = value.subexprs().len(),
                        "compiled expression published"
                    );
                }
                Ok((Arc::clone(value), published))
            }
            Err(err) => {
                self.discard(expr, fingerprint, &slot);
                tracing::debug!(expr, schema = %fingerprint, code = %err.code(), "compile failed");
                Err(err)
            }
        }
    }

    /// Insert an already-compiled expression. Returns `false` if the key was
    /// already published, in which case the existing entry is kept.
    pub(crate) fn preload(&self, compiled: CompiledExpression) -> bool {
        let fingerprint = compiled.fingerprint().clone();
        let source = compiled.source().to_owned();
        let slot = self.slot(&source, &fingerprint);
        let published = slot.value.set(Arc::new(compiled)).is_ok();
        tracing::debug!(expr = %source, schema = %fingerprint, published, "preloaded expression");
        published
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let entries = self
            .read()
            .values()
            .flat_map(HashMap::values)
            .filter(|slot| slot.value.get().is_some())
            .count();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    /// Drop every entry and reset the counters.
    pub(crate) fn clear(&self) {
        self.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, expr: &str, fingerprint: &Fingerprint) -> Arc<Slot> {
        if let Some(slot) = self.read().get(fingerprint).and_then(|by_expr| by_expr.get(expr)) {
            return Arc::clone(slot);
        }
        let mut slots = self.write();
        let slot = slots
            .entry(fingerprint.clone())
            .or_default()
            .entry(expr.to_owned())
            .or_default();
        Arc::clone(slot)
    }

    fn discard(&self, expr: &str, fingerprint: &Fingerprint, slot: &Arc<Slot>) {
        let mut slots = self.write();
        let Some(by_expr) = slots.get_mut(fingerprint) else {
            return;
        };
        if by_expr
            .get(expr)
            .is_some_and(|current| {
                // Waiters still hold a clone; they retry in this slot.
                Arc::ptr_eq(current, slot)
                    && Arc::strong_count(current) == 2
                    && current.value.get().is_none()
            })
        {
            by_expr.remove(expr);
        }
        if by_expr.is_empty() {
            slots.remove(fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::trace::Tracer;
    use crate::types::{RecordSchema, Schema};

    fn schema() -> RecordSchema {
        RecordSchema::new()
            .field("symbol", Schema::STR)
            .field("price", Schema::F64)
    }

    fn compiled(expr: &str, schema: &RecordSchema) -> Result<CompiledExpression, Error> {
        compile(expr, schema, &mut Tracer::off())
    }

    #[test]
    fn miss_then_hit() {
        let cache = CompileCache::new();
        let schema = schema();
        let fp = schema.fingerprint();

        assert!(cache.lookup("price > 1", fp).is_none());
        let (first, published) = cache
            .get_or_compile("price > 1", fp, || compiled("price > 1", &schema))
            .unwrap();
        assert!(published);

        let second = cache.lookup("price > 1", fp).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn second_compile_call_reuses_entry() {
        let cache = CompileCache::new();
        let schema = schema();
        let fp = schema.fingerprint();
        cache
            .get_or_compile("price > 1", fp, || compiled("price > 1", &schema))
            .unwrap();
        let (_, published) = cache
            .get_or_compile("price > 1", fp, || panic!("compiled twice"))
            .unwrap();
        assert!(!published);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn keys_are_per_schema_and_text() {
        let cache = CompileCache::new();
        let a = schema();
        let b = schema().field("extra", Schema::BOOL);
        for s in [&a, &b] {
            for expr in ["price > 1", "price >  1"] {
                cache
                    .get_or_compile(expr, s.fingerprint(), || compiled(expr, s))
                    .unwrap();
            }
        }
        assert_eq!(cache.stats().entries, 4);
        assert_eq!(cache.stats().misses, 4);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = CompileCache::new();
        let schema = schema();
        let fp = schema.fingerprint();
        for _ in 0..2 {
            let err = cache
                .get_or_compile("volume > 1", fp, || compiled("volume > 1", &schema))
                .unwrap_err();
            assert!(matches!(err, Error::UnknownField { .. }));
        }
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.misses, 2);
        assert!(cache.read().is_empty());
    }

    #[test]
    fn preload_keeps_first_writer() {
        let cache = CompileCache::new();
        let schema = schema();
        let entry = compiled(r#"symbol == "IBM""#, &schema).unwrap();
        assert!(cache.preload(entry.clone()));
        assert!(!cache.preload(entry));
        assert_eq!(cache.stats().entries, 1);
        assert!(cache.lookup(r#"symbol == "IBM""#, schema.fingerprint()).is_some());
    }

    #[test]
    fn clear_resets_everything() {
        let cache = CompileCache::new();
        let schema = schema();
        let fp = schema.fingerprint();
        cache
            .get_or_compile("price > 1", fp, || compiled("price > 1", &schema))
            .unwrap();
        cache.lookup("price > 1", fp);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
        assert!(cache.lookup("price > 1", fp).is_none());
    }
}
