//! Value and schema types shared by the optimizer statistics crates.
//!
//! - [`Datum`]: typed scalar with NULL and range sentinels.
//! - [`codec`]: order-preserving key encoding of datum tuples.
//! - [`Collation`] / [`FieldType`]: comparison rules and column types.
//! - [`Range`]: multi-column intervals fed to the estimators.
//! - [`Expr`]: the predicate subset statistics can evaluate.

pub mod codec;
pub mod collate;
pub mod datum;
pub mod expr;
pub mod field_type;
pub mod range;
pub mod schema;

pub use collate::Collation;
pub use datum::Datum;
pub use expr::{CompareOp, Expr, ExprColumn};
pub use field_type::{FieldKind, FieldType};
pub use range::{Range, enum_range_values};
pub use schema::{ColumnInfo, IndexColumn, IndexInfo, SchemaState, TableInfo, TableItemId};
