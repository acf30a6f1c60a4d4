//! Error type shared by the optimizer statistics crates.
//!
//! Only two kinds of failure ever leave an estimation call: a value that
//! cannot be mapped into the statistics' comparison domain, and a predicate
//! that fails to evaluate. Missing, stale or partial statistics are never
//! errors; estimators degrade to heuristics instead.

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Errors produced while estimating from statistics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// A value cannot be encoded into the order-preserving key space.
    #[error("cannot encode {kind} value: {reason}")]
    Encode { kind: &'static str, reason: String },

    /// An encoded key is malformed.
    #[error("cannot decode key at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    /// Two values have no defined ordering under the requested collation.
    #[error("cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    /// Predicate evaluation failed.
    #[error("predicate evaluation failed: {0}")]
    Eval(String),

    /// Broken internal invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StatsError {
    /// Build an [`StatsError::Internal`] from any displayable message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Build an [`StatsError::Eval`] from any displayable message.
    pub fn eval(msg: impl Into<String>) -> Self {
        Self::Eval(msg.into())
    }

    /// Build an [`StatsError::Encode`].
    pub fn encode(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Encode {
            kind,
            reason: reason.into(),
        }
    }

    /// Build an [`StatsError::Decode`].
    pub fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether the failure came from the key codec.
    #[must_use]
    pub const fn is_codec(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = StatsError::encode("float", "NaN has no ordering");
        assert_eq!(err.to_string(), "cannot encode float value: NaN has no ordering");
        assert!(err.is_codec());

        let err = StatsError::eval("division by zero");
        assert_eq!(err.to_string(), "predicate evaluation failed: division by zero");
        assert!(!err.is_codec());
    }
}
