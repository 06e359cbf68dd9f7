//! Record schema, the static field ⇄ column mapping.
//!
//! Implemented by `#[derive(Record)]`; the descriptor is a `'static` slice
//! built at compile time, so no per-call inspection happens.

use crate::codec::{TypeTag, Value};
use crate::error::TkvResult;

/// One field of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Lower-cased field name.
    pub name: &'static str,
    /// Tag written for the field, `None` for ignored fields.
    pub tag: Option<TypeTag>,
    /// Ignored fields are never persisted.
    pub ignore: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, tag: TypeTag) -> Self {
        Self {
            name,
            tag: Some(tag),
            ignore: false,
        }
    }

    pub const fn ignored(name: &'static str) -> Self {
        Self {
            name,
            tag: None,
            ignore: true,
        }
    }
}

/// A typed row persisted as one entry per column.
///
/// The identity field holds the row ordinal and is never a column.
pub trait Record: Default {
    /// Table name used in every key of this type.
    const TABLE_NAME: &'static str;

    /// Every field except the identity field, in declaration order.
    fn columns() -> &'static [ColumnDef];

    /// Current identity (row ordinal).
    fn id(&self) -> u32;

    fn set_id(&mut self, id: u32);

    /// Value of a persisted column, `None` for unknown or ignored names.
    fn column_value(&self, column: &str) -> Option<Value>;

    /// Assign a decoded value to a persisted column.
    fn set_column(&mut self, column: &str, value: Value) -> TkvResult<()>;

    /// Persisted (non-ignored) columns.
    fn stored_columns() -> impl Iterator<Item = &'static ColumnDef> {
        Self::columns().iter().filter(|c| !c.ignore)
    }
}
