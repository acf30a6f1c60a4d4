//! Typed scalar values.

use std::cmp::Ordering;
use std::fmt;

use optstats_error::{Result, StatsError};
use serde::{Deserialize, Serialize};

use crate::collate::Collation;

/// A single typed value.
///
/// `MinNotNull` and `MaxValue` are range sentinels: `MinNotNull` sorts right
/// after NULL and before every real value, `MaxValue` after every value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Datum {
    #[default]
    Null,
    MinNotNull,
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    MaxValue,
}

impl Datum {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is one of the range sentinels.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::MinNotNull | Self::MaxValue)
    }

    /// Stable kind label used in errors and traces.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::MinNotNull => "min_not_null",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::MaxValue => "max_value",
        }
    }

    /// Whether both values carry the same kind tag.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Raw bytes of a string or bytes value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) => Some(s.as_bytes()),
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::MinNotNull => 1,
            Self::Int(_) | Self::Uint(_) | Self::Float(_) => 2,
            Self::String(_) | Self::Bytes(_) => 3,
            Self::MaxValue => 4,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Uint(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(s) => s.trim().parse().ok(),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Compare two values under `collation`.
    ///
    /// Strings are compared with the collation; bytes, and strings against
    /// bytes, are compared as raw bytes. Numbers compare across signedness.
    /// A string compared against a number is parsed as a number.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Incomparable`] for NaN operands or a string that
    /// does not parse as a number.
    pub fn compare(&self, other: &Self, collation: Collation) -> Result<Ordering> {
        let (lr, rr) = (self.rank(), other.rank());
        if lr != rr && (lr != 2 || rr != 3) && (lr != 3 || rr != 2) {
            return Ok(lr.cmp(&rr));
        }
        let ord = match (self, other) {
            (Self::Null, Self::Null)
            | (Self::MinNotNull, Self::MinNotNull)
            | (Self::MaxValue, Self::MaxValue) => Some(Ordering::Equal),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Uint(a), Self::Uint(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Uint(b)) => Some(compare_int_uint(*a, *b)),
            (Self::Uint(a), Self::Int(b)) => Some(compare_int_uint(*b, *a).reverse()),
            (Self::String(a), Self::String(b)) => Some(collation.compare(a, b)),
            (Self::String(_) | Self::Bytes(_), Self::String(_) | Self::Bytes(_)) => {
                Some(self.as_bytes().cmp(&other.as_bytes()))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        ord.ok_or_else(|| StatsError::Incomparable {
            left: self.to_string(),
            right: other.to_string(),
        })
    }

    /// Total order under binary collation.
    ///
    /// Falls back to kind rank when [`Datum::compare`] has no answer, so it
    /// can drive binary searches over statistics bounds.
    #[must_use]
    pub fn cmp_total(&self, other: &Self) -> Ordering {
        self.compare(other, Collation::Binary)
            .unwrap_or_else(|_| self.rank().cmp(&other.rank()))
    }

    /// SQL truthiness. `None` is unknown (NULL).
    ///
    /// # Errors
    ///
    /// Range sentinels have no truth value.
    pub fn to_bool(&self) -> Result<Option<bool>> {
        match self {
            Self::Null => Ok(None),
            Self::Int(v) => Ok(Some(*v != 0)),
            Self::Uint(v) => Ok(Some(*v != 0)),
            Self::Float(v) => Ok(Some(*v != 0.0)),
            Self::String(_) | Self::Bytes(_) => Ok(Some(self.as_f64().is_some_and(|v| v != 0.0))),
            Self::MinNotNull | Self::MaxValue => Err(StatsError::eval(format!(
                "{} has no truth value",
                self.kind_name()
            ))),
        }
    }

    /// Approximate heap plus inline footprint in bytes.
    #[must_use]
    pub fn mem_usage(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        match self {
            Self::String(s) => inline + s.capacity(),
            Self::Bytes(b) => inline + b.capacity(),
            _ => inline,
        }
    }
}

fn compare_int_uint(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::MinNotNull => f.write_str("-inf"),
            Self::MaxValue => f.write_str("+inf"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => f.write_str(s),
                Err(_) => {
                    f.write_str("0x")?;
                    for byte in b {
                        write!(f, "{byte:02X}")?;
                    }
                    Ok(())
                }
            },
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Datum {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<Vec<u8>> for Datum {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
