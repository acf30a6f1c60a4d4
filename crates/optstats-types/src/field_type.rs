//! Column field types.

use serde::{Deserialize, Serialize};

use crate::collate::Collation;

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    TinyInt,
    Int,
    BigInt,
    Float,
    Double,
    Datetime,
    Varchar,
    Blob,
}

/// Field type of a column or expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub kind: FieldKind,
    pub unsigned: bool,
    pub collation: Collation,
    /// Declared display length, if any.
    pub flen: Option<usize>,
    /// Column carries the PRIMARY KEY flag.
    pub primary_key: bool,
}

impl FieldType {
    #[must_use]
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            unsigned: false,
            collation: Collation::Binary,
            flen: None,
            primary_key: false,
        }
    }

    #[must_use]
    pub const fn bigint() -> Self {
        Self::new(FieldKind::BigInt)
    }

    #[must_use]
    pub const fn double() -> Self {
        Self::new(FieldKind::Double)
    }

    #[must_use]
    pub const fn varchar(collation: Collation) -> Self {
        let mut tp = Self::new(FieldKind::Varchar);
        tp.collation = collation;
        tp
    }

    #[must_use]
    pub const fn blob() -> Self {
        Self::new(FieldKind::Blob)
    }

    #[must_use]
    pub const fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub const fn with_flen(mut self, flen: usize) -> Self {
        self.flen = Some(flen);
        self
    }

    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self.kind, FieldKind::Varchar | FieldKind::Blob)
    }

    /// Integer-family types are stored as 8 bytes when encoded as keys.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::TinyInt | FieldKind::Int | FieldKind::BigInt
        )
    }

    /// Width of the value in the fixed-length columnar format, `None` for
    /// variable-length types.
    #[must_use]
    pub const fn fixed_len(&self) -> Option<usize> {
        match self.kind {
            FieldKind::Float => Some(4),
            FieldKind::TinyInt | FieldKind::Int | FieldKind::BigInt | FieldKind::Double => Some(8),
            FieldKind::Datetime => Some(16),
            FieldKind::Varchar | FieldKind::Blob => None,
        }
    }

    /// Width estimate used when no statistics exist.
    #[must_use]
    pub fn estimate_width(&self) -> usize {
        if let Some(len) = self.fixed_len() {
            return len;
        }
        match self.flen {
            Some(len) if len > 0 && len <= 32 => len,
            Some(len) if len > 0 && len < 1000 => 32 + (len - 32) / 2,
            Some(len) if len > 0 => 32 + (1000 - 32) / 2,
            _ => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_width() {
        assert_eq!(FieldType::bigint().estimate_width(), 8);
        assert_eq!(FieldType::new(FieldKind::Float).estimate_width(), 4);
        assert_eq!(FieldType::blob().estimate_width(), 32);
        let vc = FieldType::varchar(Collation::Binary);
        assert_eq!(vc.clone().with_flen(20).estimate_width(), 20);
        assert_eq!(vc.clone().with_flen(100).estimate_width(), 66);
        assert_eq!(vc.with_flen(5000).estimate_width(), 516);
    }
}
