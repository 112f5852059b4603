//! ORM layer
//!
//! Provides traits and utilities for the entity structs in [`crate::entities`].
//! The `careerdb-macros` crate generates implementations of these traits from
//! annotated Rust structs, creating a single source of truth for:
//! - table and column metadata (`EntitySchema`)
//! - row decoding (`FromSqlRow`)
//! - column access by name (`FieldAccess`)
//! - relation loading (`RelationLoader`)
//!
//! Everything else is generic: one filter tree, one query builder and one
//! [`Repository`] serve all entities.
//!
//! ```rust,ignore
//! let rust_jobs = db
//!     .jobs()
//!     .query()
//!     .filter(Filter::is("poster", Filter::some("skills", Filter::eq("name", "Rust"))))
//!     .fetch_all()
//!     .await?;
//! ```

mod builder;
mod context;
mod filter;
mod group_by;
mod relations;
mod repository;
mod traits;
pub mod value;

pub use builder::*;
pub use context::{OmitRules, QueryContext};
pub use filter::*;
pub use group_by::*;
pub use relations::*;
pub use repository::*;
pub use traits::*;
pub use value::{ColumnKind, ColumnValue, SqlValue, decode_column};
