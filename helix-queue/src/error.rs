//! Queue error types.

use helix_core::{QuerierId, TenantId};

/// Queue error type.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The tenant's backlog is already at its configured maximum.
    #[error("too many outstanding requests for tenant {tenant_id}: {queue_size} queued (max {max_size})")]
    TooManyRequests {
        /// The tenant ID.
        tenant_id: TenantId,
        /// Items currently queued for the tenant.
        queue_size: usize,
        /// Configured per-tenant maximum.
        max_size: usize,
    },

    /// The querier is unknown or has announced its shutdown.
    #[error("querier {querier_id} is shutting down or not registered")]
    QuerierShuttingDown {
        /// The querier ID.
        querier_id: QuerierId,
    },

    /// The queue path addresses a level the tree does not have.
    #[error("queue path has {path_len} segments but the tree allows at most {max_len}")]
    PathTooDeep {
        /// Number of segments in the rejected path.
        path_len: usize,
        /// Maximum number of segments below the root.
        max_len: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// An identifier or path failed validation against the limits.
    #[error(transparent)]
    Core(#[from] helix_core::Error),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
