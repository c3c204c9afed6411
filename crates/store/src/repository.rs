//! The repository interface the core consumes (spec §4.7): `find_one`,
//! `iterate`, `insert`, `update`, `delete`, `create_indexes`.

use std::sync::Arc;

use async_trait::async_trait;
use ollamax_core::{Error, Result};

use crate::entity::Entity;

/// A point-in-time predicate over `T`. The document-store-backed
/// implementation translates the caller's *intent* (exact-match fields,
/// mostly) into its native query language; the in-memory implementation
/// just calls the predicate. Keeping this a closure (rather than a query
/// DSL) is deliberate: the core only ever needs "does this record match",
/// never arbitrary aggregation.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub fn filter<T, F>(f: F) -> Filter<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Entity,
{
    async fn find_one(&self, filter: Filter<T>) -> Result<T>;

    async fn iterate(&self, filter: Filter<T>) -> Result<Vec<T>>;

    /// Raises [`Error::DuplicateKey`] when a unique index is violated.
    async fn insert(&self, record: T) -> Result<T>;

    /// Partial write: `apply` mutates the in-place record; returns
    /// [`Error::NotFound`] if `id` is absent.
    async fn update(&self, id: &str, apply: Box<dyn FnOnce(&mut T) + Send>) -> Result<T>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// A boot-time no-op for the in-memory backend; the document-store
    /// backend issues the actual index-creation calls here.
    async fn create_indexes(&self) -> Result<()> {
        Ok(())
    }
}

/// Helper used by every `find_one` caller that wants the spec's literal
/// `NotFound` semantics instead of an `Option`.
pub fn not_found(entity: &'static str) -> Error {
    Error::NotFound(entity)
}
