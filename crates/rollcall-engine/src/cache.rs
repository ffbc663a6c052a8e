//! Load-on-demand template cache with an explicit invalidate-on-enroll hook.
//!
//! Owned by the engine thread, which is also the only template writer, so
//! a cached gallery can only go stale through its own enrollments.

use rollcall_core::IdentityTemplate;
use rollcall_session::{StoreError, TemplateStore};
use std::sync::Arc;

pub struct TemplateCache {
    store: Arc<dyn TemplateStore>,
    cached: Option<Vec<IdentityTemplate>>,
}

impl TemplateCache {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            store,
            cached: None,
        }
    }

    /// The enrolled gallery, loading from the store on first use or after
    /// an invalidation.
    pub fn templates(&mut self) -> Result<&[IdentityTemplate], StoreError> {
        if self.cached.is_none() {
            let templates = self.store.load_templates()?;
            tracing::debug!(count = templates.len(), "template gallery loaded");
            self.cached = Some(templates);
        }
        Ok(self.cached.as_deref().unwrap_or_default())
    }

    /// Drop the cached gallery; the next read reloads from the store.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rollcall_core::Embedding;
    use rollcall_session::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: MemoryStore,
        loads: AtomicUsize,
    }

    impl TemplateStore for CountingStore {
        fn put_template(&self, t: &IdentityTemplate) -> Result<(), StoreError> {
            self.inner.put_template(t)
        }
        fn get_template(&self, id: i64) -> Result<Option<IdentityTemplate>, StoreError> {
            self.inner.get_template(id)
        }
        fn load_templates(&self) -> Result<Vec<IdentityTemplate>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load_templates()
        }
        fn delete_template(&self, id: i64) -> Result<bool, StoreError> {
            self.inner.delete_template(id)
        }
    }

    fn template(identity_id: i64) -> IdentityTemplate {
        IdentityTemplate {
            identity_id,
            embedding: Embedding {
                values: vec![1.0, 0.0],
            },
            sample_count: 10,
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn loads_once_until_invalidated() {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            loads: AtomicUsize::new(0),
        });
        store.put_template(&template(1)).unwrap();

        let mut cache = TemplateCache::new(store.clone());
        assert_eq!(cache.templates().unwrap().len(), 1);
        assert_eq!(cache.templates().unwrap().len(), 1);
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        store.put_template(&template(2)).unwrap();
        // Stale until told otherwise.
        assert_eq!(cache.templates().unwrap().len(), 1);

        cache.invalidate();
        assert_eq!(cache.templates().unwrap().len(), 2);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }
}
