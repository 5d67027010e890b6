//! Strongly-typed identifiers and queue addressing for the scheduler.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up IDs.
//! Tenant and querier identifiers are opaque strings supplied by callers,
//! so both wrap a `String` rather than a numeric value.

use std::borrow::Borrow;
use std::fmt;

/// Macro to generate strongly-typed string ID wrappers.
///
/// Each ID type wraps a `String` and provides:
/// - Type safety (can't pass a `QuerierId` where a `TenantId` is expected)
/// - Debug/Display formatting
/// - Cheap borrowing via `as_str()`
macro_rules! define_string_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID from any string-like value.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the ID as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the ID is the empty string.
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Returns the length of the ID in bytes.
            #[inline]
            #[must_use]
            pub fn len(&self) -> usize {
                self.0.len()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        // Lets maps keyed by the ID be queried with a tree node name.
        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(TenantId, "tenant", "Identifier of the tenant that owns a queued request.");
define_string_id!(QuerierId, "querier", "Identifier of a querier process pulling work.");

/// Position within a node's rotation of children.
///
/// `LocalQueue` is the sentinel that selects the node's own item queue
/// instead of one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    /// Select the node's local queue.
    #[default]
    LocalQueue,
    /// Select the child at this index of the rotation order.
    Child(usize),
}

impl Position {
    /// Returns the child index, or `None` for the local queue sentinel.
    #[must_use]
    pub const fn child_index(self) -> Option<usize> {
        match self {
            Self::LocalQueue => None,
            Self::Child(index) => Some(index),
        }
    }

    /// Returns true if this is the local queue sentinel.
    #[must_use]
    pub const fn is_local_queue(self) -> bool {
        matches!(self, Self::LocalQueue)
    }
}

/// Ordered sequence of node names addressing a queue node below the root.
///
/// The first segment of a broker-built path is always the tenant ID.
/// Paths are rebuilt per request and never mutated in place by the tree.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct QueuePath(Vec<String>);

impl QueuePath {
    /// Creates an empty path (addresses the root node).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Creates a path from its segments.
    #[must_use]
    pub const fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Creates a tenant path with optional additional segments.
    #[must_use]
    pub fn for_tenant(tenant_id: &TenantId, dimensions: &[String]) -> Self {
        let mut segments = Vec::with_capacity(1 + dimensions.len());
        segments.push(tenant_id.as_str().to_string());
        segments.extend(dimensions.iter().cloned());
        Self(segments)
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the path addresses the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the tenant segment (the first one), if any.
    #[must_use]
    pub fn tenant(&self) -> Option<TenantId> {
        self.0.first().map(|segment| TenantId::new(segment.as_str()))
    }

    /// Returns the path truncated to its first `len` segments.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }

    /// Prepends a segment.
    pub fn push_front(&mut self, segment: String) {
        self.0.insert(0, segment);
    }
}

impl fmt::Debug for QueuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path{:?}", self.0)
    }
}

impl fmt::Display for QueuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl From<Vec<&str>> for QueuePath {
    fn from(segments: Vec<&str>) -> Self {
        Self(segments.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for QueuePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}
