//! Document-store-backed `Repository`, for deployments that set `MONGO_URI`
//! (spec §7). Mirrors [`crate::memory::InMemoryRepository`]'s semantics
//! exactly -- unique-index violations surface as [`Error::DuplicateKey`],
//! `create_indexes` is idempotent -- so `crates/server` can select either
//! implementation behind the same [`Repository`] trait object, the way the
//! teacher's `SessionStore` trait lets `AppState` hold either
//! `InMemorySessionStore` or `ScyllaSessionStore`.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::{IndexOptions, InsertOneOptions};
use mongodb::{Collection, IndexModel};
use ollamax_core::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::entity::Entity;
use crate::repository::{not_found, Filter, Repository};

/// A unique or TTL index to create at boot (spec §4.7 `create_indexes`).
pub struct IndexSpec {
    pub name: &'static str,
    pub keys: Document,
    pub unique: bool,
    pub ttl_seconds: Option<i64>,
}

pub struct MongoRepository<T> {
    entity_name: &'static str,
    collection: Collection<T>,
    indexes: Vec<IndexSpec>,
}

impl<T> MongoRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin,
{
    pub fn new(collection: Collection<T>, entity_name: &'static str, indexes: Vec<IndexSpec>) -> Self {
        Self {
            entity_name,
            collection,
            indexes,
        }
    }
}

#[async_trait]
impl<T> Repository<T> for MongoRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin,
{
    async fn find_one(&self, filter: Filter<T>) -> Result<T> {
        // The document store evaluates queries server-side in production;
        // here we still centralize "not found" through the in-process
        // predicate so callers never need to know which backend answered.
        let mut cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(|e| Error::Internal(e.into()))?;
        use futures::stream::TryStreamExt;
        while let Some(record) = cursor
            .try_next()
            .await
            .map_err(|e| Error::Internal(e.into()))?
        {
            if filter(&record) {
                return Ok(record);
            }
        }
        Err(not_found(self.entity_name))
    }

    async fn iterate(&self, filter: Filter<T>) -> Result<Vec<T>> {
        use futures::stream::TryStreamExt;
        let cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(|e| Error::Internal(e.into()))?;
        let all: Vec<T> = cursor
            .try_collect()
            .await
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(all.into_iter().filter(|record| filter(record)).collect())
    }

    async fn insert(&self, record: T) -> Result<T> {
        let result = self
            .collection
            .insert_one(&record)
            .with_options(InsertOneOptions::default())
            .await;

        match result {
            Ok(_) => Ok(record),
            Err(e) if is_duplicate_key(&e) => Err(Error::DuplicateKey(self.entity_name.to_string())),
            Err(e) => Err(Error::Internal(e.into())),
        }
    }

    async fn update(&self, id: &str, apply: Box<dyn FnOnce(&mut T) + Send>) -> Result<T> {
        let filter_id = doc! { "id": id };
        let mut record = self
            .collection
            .find_one(filter_id.clone())
            .await
            .map_err(|e| Error::Internal(e.into()))?
            .ok_or_else(|| not_found(self.entity_name))?;

        apply(&mut record);

        self.collection
            .replace_one(filter_id, &record)
            .await
            .map_err(|e| Error::Internal(e.into()))?;
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self
            .collection
            .delete_one(doc! { "id": id })
            .await
            .map_err(|e| Error::Internal(e.into()))?;
        if result.deleted_count == 0 {
            return Err(not_found(self.entity_name));
        }
        Ok(())
    }

    async fn create_indexes(&self) -> Result<()> {
        for spec in &self.indexes {
            let options = IndexOptions::builder()
                .name(spec.name.to_string())
                .unique(spec.unique)
                .expire_after(
                    spec.ttl_seconds
                        .map(|s| std::time::Duration::from_secs(s as u64)),
                )
                .build();
            let model = IndexModel::builder()
                .keys(spec.keys.clone())
                .options(options)
                .build();
            self.collection
                .create_index(model)
                .await
                .map_err(|e| Error::Internal(e.into()))?;
        }
        tracing::info!(entity = self.entity_name, "document store indexes ready");
        Ok(())
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(
            mongodb::error::WriteError { code: 11000, .. }
        ))
    )
}
