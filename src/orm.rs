//! ORM-side contract (§6.2): what the core consumes, per session, from
//! the ORM's change tracker and model. This module is a trait boundary
//! only — the ORM itself is an out-of-scope external collaborator.

use crate::model::Tag;

/// State of a tracked entity within a save's change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
    Unchanged,
    Detached,
}

/// An opaque handle the ORM uses to identify a tracked entity instance.
/// The core never inspects entity contents, only resolves it to a table
/// name through [`Model`].
pub trait TrackedEntity {
    /// A stable type identifier the [`Model`] can resolve to a table name.
    fn entity_type_id(&self) -> &str;
}

/// Describes an owned-entity navigation off a tracked entity: a nested
/// entity whose table must also be invalidated when the parent changes.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub target_entity_type_id: String,
    pub is_owned: bool,
}

/// Per-entity-type model metadata the core needs to resolve tables.
pub trait Model {
    /// `FindEntityType(entity) -> (table-name?, navigations)`.
    fn find_entity_type(&self, entity_type_id: &str) -> Option<(String, Vec<Navigation>)>;
}

/// One entry in the ORM's change tracker: a tracked entity plus its
/// current state.
pub struct ChangeTrackerEntry<E: TrackedEntity> {
    pub entity: E,
    pub state: EntityState,
}

/// A snapshot iterator over a session's pending changes, consumed at
/// `SavingChanges` time (spec.md §4.I step 1). Implementations are
/// expected to be a cheap, already-materialized `Vec`-backed iterator: the
/// ORM's own change tracker owns the live state.
pub trait ChangeTracker<E: TrackedEntity> {
    fn entries(&self) -> Vec<ChangeTrackerEntry<E>>;
}

/// Opaque identifier for an ORM session (e.g. a `DbContext` instance).
/// Only used as a map key; the core never dereferences it.
pub type SessionId = u64;

/// Resolve the table names a save's change set depends on: every tracked
/// entity in state Added/Modified/Deleted, plus the tables of any owned
/// navigations, lowercased and deduplicated (spec.md §4.I step 1).
pub fn resolve_changed_tables<E: TrackedEntity>(
    model: &dyn Model,
    entries: &[ChangeTrackerEntry<E>],
) -> std::collections::HashSet<Tag> {
    let mut tags = std::collections::HashSet::new();

    for entry in entries {
        if !matches!(
            entry.state,
            EntityState::Added | EntityState::Modified | EntityState::Deleted
        ) {
            continue;
        }

        if let Some((table, navigations)) = model.find_entity_type(entry.entity.entity_type_id())
        {
            tags.insert(Tag::new(table));
            for nav in navigations {
                if nav.is_owned {
                    if let Some((nav_table, _)) = model.find_entity_type(&nav.target_entity_type_id)
                    {
                        tags.insert(Tag::new(nav_table));
                    }
                }
            }
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

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
                "Product" => Some((
                    "Products".to_string(),
                    vec![Navigation {
                        target_entity_type_id: "ProductMetadata".to_string(),
                        is_owned: true,
                    }],
                )),
                "ProductMetadata" => Some(("ProductMetadata".to_string(), vec![])),
                "Order" => Some(("Orders".to_string(), vec![])),
                _ => None,
            }
        }
    }

    #[test]
    fn resolves_tables_for_added_modified_deleted_only() {
        let model = FakeModel;
        let entries = vec![
            ChangeTrackerEntry {
                entity: FakeEntity("Product"),
                state: EntityState::Modified,
            },
            ChangeTrackerEntry {
                entity: FakeEntity("Order"),
                state: EntityState::Added,
            },
            ChangeTrackerEntry {
                entity: FakeEntity("Order"),
                state: EntityState::Unchanged,
            },
        ];
        let tags = resolve_changed_tables(&model, &entries);
        assert!(tags.contains(&Tag::new("products")));
        assert!(tags.contains(&Tag::new("orders")));
        assert!(tags.contains(&Tag::new("productmetadata")));
    }

    #[test]
    fn unchanged_entities_contribute_nothing() {
        let model = FakeModel;
        let entries = vec![ChangeTrackerEntry {
            entity: FakeEntity("Product"),
            state: EntityState::Unchanged,
        }];
        let tags = resolve_changed_tables(&model, &entries);
        assert!(tags.is_empty());
    }
}
