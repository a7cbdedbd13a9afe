//! Save interceptor (component I): the write-side half of the pipeline,
//! grounded in the teacher's `CacheInvalidator::unregister`/table-map
//! bookkeeping (`cache/cache_invalidation.rs`) but keyed by ORM session
//! instead of cache key, per spec.md §4.I's three-phase protocol.

use crate::config::StashConfig;
use crate::model::Tag;
use crate::orm::{self, ChangeTrackerEntry, Model, SessionId, TrackedEntity};
use crate::store::Store;
use crate::telemetry::{CacheEvent, EventKind};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Write-side interceptor. The pending slot is a session-keyed map rather
/// than the source's weak-keyed map (spec.md §4.I): a save's three
/// phases are already threaded through the same `SessionId` by the ORM,
/// so there is no async-local restoration hazard to design around here
/// the way there is for the read-side key carry.
pub struct SaveInterceptor {
    store: Arc<dyn Store>,
    config: Arc<StashConfig>,
    pending: DashMap<SessionId, HashSet<Tag>>,
}

impl SaveInterceptor {
    pub fn new(store: Arc<dyn Store>, config: Arc<StashConfig>) -> Self {
        Self {
            store,
            config,
            pending: DashMap::new(),
        }
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(sink) = &self.config.on_event {
            sink(event);
        }
    }

    /// Pre-save phase: resolve and stash the tables this save's change set
    /// depends on. A no-op if nothing in the change set is Added/Modified/
    /// Deleted.
    pub fn pre_save<E: TrackedEntity>(
        &self,
        session: SessionId,
        model: &dyn Model,
        entries: &[ChangeTrackerEntry<E>],
    ) {
        let tags = orm::resolve_changed_tables(model, entries);
        if !tags.is_empty() {
            self.pending.insert(session, tags);
        }
    }

    /// Post-save success phase: invalidate the tables captured pre-save.
    pub fn post_save_success(&self, session: SessionId) {
        let Some((_, tags)) = self.pending.remove(&session) else {
            return;
        };

        self.store.invalidate_by_tags(&tags);
        self.emit(
            CacheEvent::new(EventKind::CacheInvalidated)
                .with_tables(tags.iter().map(|t| t.to_string()).collect()),
        );
    }

    /// Post-save failure phase: discard the captured tags without
    /// touching the cache.
    pub fn post_save_failure(&self, session: SessionId) {
        self.pending.remove(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tag;
    use crate::orm::{EntityState, Navigation};
    use crate::store::local::LocalStore;
    use crate::telemetry::Counters;

    struct FakeEntity(&'static str);
    impl TrackedEntity for FakeEntity {
        fn entity_type_id(&self) -> &str {
            self.0
        }
    }

    struct FakeModel;
    impl Model for FakeModel {
        fn find_entity_type(&self, entity_type_id: &str) -> Option<(String, Vec<Navigation>)> {
            match entity_type_id {
                "Product" => Some(("Products".to_string(), vec![])),
                _ => None,
            }
        }
    }

    fn interceptor() -> (SaveInterceptor, Arc<dyn Store>) {
        let counters = Arc::new(Counters::default());
        let store: Arc<dyn Store> = Arc::new(LocalStore::new(counters));
        let interceptor = SaveInterceptor::new(store.clone(), Arc::new(StashConfig::default()));
        (interceptor, store)
    }

    #[test]
    fn post_save_success_invalidates_captured_tables() {
        let (interceptor, store) = interceptor();
        store
            .set(
                crate::key::Fingerprint::from_raw("k1"),
                HashSet::from([Tag::new("products")]),
                Arc::new(crate::model::ResultSet::new(vec![], vec![], -1, chrono::Utc::now())),
                Default::default(),
            )
            .unwrap();

        let entries = vec![ChangeTrackerEntry {
            entity: FakeEntity("Product"),
            state: EntityState::Modified,
        }];
        interceptor.pre_save(1, &FakeModel, &entries);
        interceptor.post_save_success(1);

        assert!(store.get(&crate::key::Fingerprint::from_raw("k1")).unwrap().is_none());
    }

    #[test]
    fn post_save_failure_discards_without_invalidating() {
        let (interceptor, store) = interceptor();
        store
            .set(
                crate::key::Fingerprint::from_raw("k1"),
                HashSet::from([Tag::new("products")]),
                Arc::new(crate::model::ResultSet::new(vec![], vec![], -1, chrono::Utc::now())),
                Default::default(),
            )
            .unwrap();

        let entries = vec![ChangeTrackerEntry {
            entity: FakeEntity("Product"),
            state: EntityState::Modified,
        }];
        interceptor.pre_save(1, &FakeModel, &entries);
        interceptor.post_save_failure(1);

        assert!(store.get(&crate::key::Fingerprint::from_raw("k1")).unwrap().is_some());
    }

    #[test]
    fn unchanged_only_change_set_never_registers_a_pending_slot() {
        let (interceptor, _store) = interceptor();
        let entries = vec![ChangeTrackerEntry {
            entity: FakeEntity("Product"),
            state: EntityState::Unchanged,
        }];
        interceptor.pre_save(1, &FakeModel, &entries);
        assert!(interceptor.pending.get(&1).is_none());
    }
}
