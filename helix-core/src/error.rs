//! Validation errors for scheduler input.
//!
//! Every identifier, queue path and registry insert is checked against
//! [`Limits`](crate::Limits) before it can grow scheduler state.

use std::fmt;

/// The result type for Helix core validation.
pub type Result<T> = std::result::Result<T, Error>;

/// Rejected identifiers, paths and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An identifier was the empty string.
    EmptyId {
        /// Kind of identifier ("tenant" or "querier").
        kind: &'static str,
    },

    /// An identifier was longer than allowed.
    IdTooLong {
        /// Kind of identifier ("tenant" or "querier").
        kind: &'static str,
        /// Maximum length in bytes.
        max_bytes: u32,
        /// Actual length in bytes.
        actual_bytes: usize,
    },

    /// A queue path carried more routing dimensions than the tree has levels for.
    TooManyDimensions {
        /// Maximum number of dimensions.
        max: u32,
        /// Dimensions in the rejected path.
        actual: usize,
    },

    /// A registry is at its configured size.
    RegistryFull {
        /// Which registry ("tenants" or "queriers").
        registry: &'static str,
        /// Configured maximum entries.
        max: u32,
    },

    /// A limit is out of range or inconsistent with another.
    InvalidLimit {
        /// The limit's field name.
        name: &'static str,
        /// What the limit must satisfy.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId { kind } => write!(f, "{kind} id must not be empty"),
            Self::IdTooLong {
                kind,
                max_bytes,
                actual_bytes,
            } => write!(
                f,
                "{kind} id is {actual_bytes} bytes, longer than the {max_bytes} byte limit"
            ),
            Self::TooManyDimensions { max, actual } => {
                write!(f, "queue path has {actual} routing dimensions (max {max})")
            }
            Self::RegistryFull { registry, max } => {
                write!(f, "{registry} registry is full ({max} entries)")
            }
            Self::InvalidLimit { name, reason } => write!(f, "invalid limit {name}: {reason}"),
        }
    }
}

impl std::error::Error for Error {}
