//! In-memory `Repository` implementation, grounded on the teacher's
//! `InMemorySessionStore` (`crates/server/src/session.rs`): a
//! `parking_lot::RwLock<HashMap<..>>` guarded store, safe to use from tests
//! and from a single-replica deployment without a document store.
//!
//! Honors unique indexes (spec §3 invariants) and sweeps TTL-expired
//! records lazily on every access, so the "at most a few seconds after
//! `expires_after`" bound (spec §3) holds for any access cadence driven by
//! real traffic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use ollamax_core::{Error, Result};
use parking_lot::RwLock;

use crate::entity::Entity;
use crate::repository::{not_found, Filter, Repository};

pub struct InMemoryRepository<T: Entity> {
    entity_name: &'static str,
    records: RwLock<HashMap<String, T>>,
    unique_keys: Vec<(&'static str, crate::entity::UniqueKeyFn<T>)>,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new(entity_name: &'static str) -> Self {
        Self {
            entity_name,
            records: RwLock::new(HashMap::new()),
            unique_keys: T::unique_keys(),
        }
    }

    /// Drop any record whose TTL has elapsed. Called before every read so
    /// that expired sessions (spec §3) never surface to callers, without
    /// running a background sweep task.
    fn evict_expired(&self) {
        let now = Utc::now();
        let mut records = self.records.write();
        records.retain(|_, record| match record.expires_at() {
            Some(expiry) => expiry > now,
            None => true,
        });
    }

    fn conflicting_key(&self, candidate: &T, ignore_id: Option<&str>) -> Option<&'static str> {
        let records = self.records.read();
        for (name, extractor) in &self.unique_keys {
            let Some(candidate_value) = extractor(candidate) else {
                continue;
            };
            for (id, existing) in records.iter() {
                if Some(id.as_str()) == ignore_id {
                    continue;
                }
                if extractor(existing).as_deref() == Some(candidate_value.as_str()) {
                    return Some(name);
                }
            }
        }
        None
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn find_one(&self, filter: Filter<T>) -> Result<T> {
        self.evict_expired();
        self.records
            .read()
            .values()
            .find(|record| filter(record))
            .cloned()
            .ok_or_else(|| not_found(self.entity_name))
    }

    async fn iterate(&self, filter: Filter<T>) -> Result<Vec<T>> {
        self.evict_expired();
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| filter(record))
            .cloned()
            .collect())
    }

    async fn insert(&self, record: T) -> Result<T> {
        self.evict_expired();
        if let Some(field) = self.conflicting_key(&record, None) {
            return Err(Error::DuplicateKey(field.to_string()));
        }
        let id = record.id();
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(Error::DuplicateKey("id".to_string()));
        }
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, apply: Box<dyn FnOnce(&mut T) + Send>) -> Result<T> {
        self.evict_expired();
        let mut candidate = {
            let records = self.records.read();
            records
                .get(id)
                .cloned()
                .ok_or_else(|| not_found(self.entity_name))?
        };
        apply(&mut candidate);
        if let Some(field) = self.conflicting_key(&candidate, Some(id)) {
            return Err(Error::DuplicateKey(field.to_string()));
        }
        let mut records = self.records.write();
        records.insert(id.to_string(), candidate.clone());
        Ok(candidate)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.write();
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(self.entity_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::UniqueKeyFn;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: String,
        name: String,
    }

    impl Entity for Widget {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn unique_keys() -> Vec<(&'static str, UniqueKeyFn<Self>)> {
            vec![("name", Arc::new(|w: &Widget| Some(w.name.clone())))]
        }
    }

    #[tokio::test]
    async fn duplicate_unique_key_is_rejected() {
        let repo = InMemoryRepository::<Widget>::new("widget");
        repo.insert(Widget {
            id: "1".into(),
            name: "alpha".into(),
        })
        .await
        .unwrap();

        let err = repo
            .insert(Widget {
                id: "2".into(),
                name: "alpha".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn find_one_reports_not_found() {
        let repo = InMemoryRepository::<Widget>::new("widget");
        let err = repo
            .find_one(crate::repository::filter(|w: &Widget| w.name == "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("widget")));
    }

    #[tokio::test]
    async fn update_applies_closure_and_persists() {
        let repo = InMemoryRepository::<Widget>::new("widget");
        repo.insert(Widget {
            id: "1".into(),
            name: "alpha".into(),
        })
        .await
        .unwrap();

        let updated = repo
            .update(
                "1",
                Box::new(|w: &mut Widget| w.name = "beta".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "beta");
    }
}
