//! Repository layer over the document store (spec §4.7, §6): an
//! entity-agnostic `Repository<T>` trait, an in-memory implementation for
//! tests and single-replica deployments, and a MongoDB-backed
//! implementation for the rest.

pub mod entity;
pub mod entities;
pub mod memory;
pub mod mongo;
pub mod repository;

pub use entity::{Entity, UniqueKeyFn};
pub use memory::InMemoryRepository;
pub use mongo::{IndexSpec, MongoRepository};
pub use repository::{filter, not_found, Filter, Repository};
