//! Manual invalidation API (component J): the four user-facing operations
//! named in spec.md §4.J, grounded in the teacher's `CacheInvalidator`
//! public methods (`unregister`, bulk-clear) but re-targeted at the
//! tag-indexed [`Store`] trait instead of a bespoke table/row map.

use crate::config::StashConfig;
use crate::key::Fingerprint;
use crate::model::Tag;
use crate::orm::Model;
use crate::store::Store;
use crate::telemetry::{CacheEvent, EventKind};
use std::sync::Arc;

/// The four manual invalidation operations, all telemetry-observable.
pub struct InvalidationApi {
    store: Arc<dyn Store>,
    config: Arc<StashConfig>,
}

impl InvalidationApi {
    pub fn new(store: Arc<dyn Store>, config: Arc<StashConfig>) -> Self {
        Self { store, config }
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(sink) = &self.config.on_event {
            sink(event);
        }
    }

    /// `InvalidateTables(names)`.
    pub fn invalidate_tables<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: std::collections::HashSet<Tag> =
            names.into_iter().map(|n| Tag::new(n.as_ref())).collect();
        let removed = self.store.invalidate_by_tags(&tags);
        self.emit(
            CacheEvent::new(EventKind::CacheInvalidated)
                .with_tables(tags.iter().map(|t| t.to_string()).collect()),
        );
        removed
    }

    /// `InvalidateEntities(session, entity-types)`. The session parameter
    /// is accepted for contract parity with spec.md §4.J but is otherwise
    /// unused here: resolving an entity type to a table name does not
    /// depend on any per-session state, unlike the write-side capture in
    /// [`crate::save::SaveInterceptor`].
    pub fn invalidate_entities(
        &self,
        model: &dyn Model,
        entity_type_ids: &[String],
    ) -> usize {
        let tags: std::collections::HashSet<Tag> = entity_type_ids
            .iter()
            .filter_map(|id| model.find_entity_type(id))
            .map(|(table, _)| Tag::new(table))
            .collect();
        let removed = self.store.invalidate_by_tags(&tags);
        self.emit(
            CacheEvent::new(EventKind::CacheInvalidated)
                .with_tables(tags.iter().map(|t| t.to_string()).collect()),
        );
        removed
    }

    /// `InvalidateKey(fingerprint)`.
    pub fn invalidate_key(&self, key: &Fingerprint) {
        self.store.invalidate_key(key);
        self.emit(CacheEvent::new(EventKind::CacheInvalidated).with_key(key.as_str()));
    }

    /// `InvalidateAll()`.
    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
        self.emit(CacheEvent::new(EventKind::CacheInvalidated));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultSet;
    use crate::orm::Navigation;
    use crate::store::local::LocalStore;
    use crate::telemetry::Counters;
    use std::collections::HashSet;

    struct FakeModel;
    impl Model for FakeModel {
        fn find_entity_type(&self, entity_type_id: &str) -> Option<(String, Vec<Navigation>)> {
            match entity_type_id {
                "Product" => Some(("Products".to_string(), vec![])),
                _ => None,
            }
        }
    }

    fn api() -> (InvalidationApi, Arc<dyn Store>) {
        let counters = Arc::new(Counters::default());
        let store: Arc<dyn Store> = Arc::new(LocalStore::new(counters));
        let api = InvalidationApi::new(store.clone(), Arc::new(StashConfig::default()));
        (api, store)
    }

    fn seed(store: &Arc<dyn Store>, key: &str, tags: &[&str]) {
        store
            .set(
                Fingerprint::from_raw(key),
                tags.iter().map(|t| Tag::new(*t)).collect(),
                Arc::new(ResultSet::new(vec![], vec![], -1, chrono::Utc::now())),
                Default::default(),
            )
            .unwrap();
    }

    #[test]
    fn invalidate_tables_removes_only_matching_keys() {
        let (api, store) = api();
        seed(&store, "k1", &["products"]);
        seed(&store, "k2", &["orders"]);

        let removed = api.invalidate_tables(["products"]);
        assert_eq!(removed, 1);
        assert!(store.get(&Fingerprint::from_raw("k1")).unwrap().is_none());
        assert!(store.get(&Fingerprint::from_raw("k2")).unwrap().is_some());
    }

    #[test]
    fn invalidate_entities_resolves_table_via_model() {
        let (api, store) = api();
        seed(&store, "k1", &["products"]);

        let removed = api.invalidate_entities(&FakeModel, &["Product".to_string()]);
        assert_eq!(removed, 1);
        assert!(store.get(&Fingerprint::from_raw("k1")).unwrap().is_none());
    }

    #[test]
    fn invalidate_entities_ignores_unresolvable_entity_types() {
        let (api, _store) = api();
        let removed = api.invalidate_entities(&FakeModel, &["Ghost".to_string()]);
        assert_eq!(removed, 0);
    }

    #[test]
    fn invalidate_key_removes_single_entry() {
        let (api, store) = api();
        seed(&store, "k1", &["products"]);
        api.invalidate_key(&Fingerprint::from_raw("k1"));
        assert!(store.get(&Fingerprint::from_raw("k1")).unwrap().is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let (api, store) = api();
        seed(&store, "k1", &["products"]);
        seed(&store, "k2", &["orders"]);
        api.invalidate_all();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn invalidate_tables_with_no_entries_is_a_harmless_zero() {
        let (api, _store) = api();
        let removed: usize = api.invalidate_tables(HashSet::<String>::new());
        assert_eq!(removed, 0);
    }
}
