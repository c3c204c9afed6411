//! The vocabulary the repository layer needs from a domain type: a stable
//! id, a set of unique-index extractors, and an optional TTL.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A key extractor used to enforce a unique index on insert (spec §3: "a
/// user's key is unique", "unique by URL", ...). Two records collide when
/// their extracted keys are equal and non-empty.
pub type UniqueKeyFn<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Anything the in-memory/document-store repositories can persist.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> String;

    /// Index descriptors used by [`crate::memory::InMemoryRepository::new`]
    /// and mirrored by [`crate::mongo::MongoRepository::create_indexes`].
    /// Named `unique_keys` because every entity in spec §3 that declares an
    /// index declares a *unique* one; spec §6's TTL index is handled
    /// separately via [`Entity::expires_at`].
    fn unique_keys() -> Vec<(&'static str, UniqueKeyFn<Self>)>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// `Some(expiry)` for TTL-indexed entities (spec §3: `Session`). The
    /// default means "no TTL index".
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}
