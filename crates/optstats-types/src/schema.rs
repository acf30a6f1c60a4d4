//! Table, column and index metadata consumed by the statistics layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field_type::FieldType;

/// Online schema-change state of a column or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SchemaState {
    None,
    DeleteOnly,
    WriteOnly,
    WriteReorganization,
    #[default]
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub id: i64,
    /// Lower-cased column name.
    pub name: String,
    pub field_type: FieldType,
    pub state: SchemaState,
    /// Hidden columns back expression indexes and never carry statistics.
    pub hidden: bool,
}

impl ColumnInfo {
    #[must_use]
    pub fn new(id: i64, name: &str, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.to_ascii_lowercase(),
            field_type,
            state: SchemaState::Public,
            hidden: false,
        }
    }
}

/// One column of an index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    /// Position of the column in [`TableInfo::columns`].
    pub offset: usize,
    /// Prefix length for prefix indexes, `None` when the whole value is indexed.
    pub length: Option<usize>,
}

impl IndexColumn {
    #[must_use]
    pub fn new(name: &str, offset: usize) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            offset,
            length: None,
        }
    }

    #[must_use]
    pub const fn with_prefix_len(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub state: SchemaState,
}

impl IndexInfo {
    #[must_use]
    pub fn new(id: i64, name: &str, columns: Vec<IndexColumn>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            columns,
            unique: false,
            state: SchemaState::Public,
        }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Whether the first indexed column is stored in full.
    #[must_use]
    pub fn is_full_first_column(&self) -> bool {
        self.columns.first().is_some_and(|c| c.length.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
    /// The integer primary key doubles as the row handle.
    pub pk_is_handle: bool,
}

impl TableInfo {
    #[must_use]
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            columns: Vec::new(),
            indices: Vec::new(),
            pk_is_handle: false,
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indices.push(index);
        self
    }

    #[must_use]
    pub const fn with_pk_is_handle(mut self) -> Self {
        self.pk_is_handle = true;
        self
    }
}

/// Identifies one column or index of one physical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableItemId {
    pub table_id: i64,
    pub id: i64,
    pub is_index: bool,
}

impl TableItemId {
    #[must_use]
    pub const fn column(table_id: i64, id: i64) -> Self {
        Self {
            table_id,
            id,
            is_index: false,
        }
    }

    #[must_use]
    pub const fn index(table_id: i64, id: i64) -> Self {
        Self {
            table_id,
            id,
            is_index: true,
        }
    }
}

impl fmt::Display for TableItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_index { "index" } else { "column" };
        write!(f, "table {} {kind} {}", self.table_id, self.id)
    }
}
