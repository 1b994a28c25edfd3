//! `clubseed-core`: entity kinds, keys and validation for the club seeder.
//!
//! This crate contains **pure domain** primitives (no store access).

pub mod entity;
pub mod error;
pub mod id;
pub mod validate;
pub mod value;

pub use entity::{ColumnType, EntityKind};
pub use error::{DomainError, DomainResult};
pub use id::EntityId;
pub use value::{NaturalKey, Predicate, Row, Scalar, Values};
