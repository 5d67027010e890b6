//! Queue configuration.

use helix_core::Limits;

use crate::error::{QueueError, QueueResult};

/// Default per-tenant backlog limit.
pub const MAX_TENANT_QUEUE_SIZE_DEFAULT: usize = 100;

/// Default fraction of querier-worker connections reserved for other components.
pub const TARGET_RESERVED_CAPACITY_DEFAULT: f64 = 0.4;

/// Configuration for the queue broker.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of queued requests per tenant.
    pub max_tenant_queue_size: usize,

    /// Whether requests are split into sub-queues by their routing dimensions.
    pub additional_queue_dimensions_enabled: bool,

    /// How long a disconnected querier keeps its shuffle-shard slot (microseconds).
    ///
    /// Zero removes the querier as soon as its last connection closes.
    pub querier_forget_delay_us: u64,

    /// Fraction of connected querier workers reserved for other query components.
    ///
    /// Zero disables utilization-based skip-over.
    pub target_reserved_capacity: f64,

    /// Bounds on caller-supplied input.
    pub limits: Limits,
}

impl QueueConfig {
    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_tenant_queue_size: 10,
            additional_queue_dimensions_enabled: true,
            querier_forget_delay_us: 1_000_000,
            target_reserved_capacity: TARGET_RESERVED_CAPACITY_DEFAULT,
            limits: Limits::new(),
        }
    }

    /// Sets the per-tenant backlog limit.
    #[must_use]
    pub const fn with_max_tenant_queue_size(mut self, size: usize) -> Self {
        self.max_tenant_queue_size = size;
        self
    }

    /// Enables or disables routing-dimension sub-queues.
    #[must_use]
    pub const fn with_additional_queue_dimensions(mut self, enabled: bool) -> Self {
        self.additional_queue_dimensions_enabled = enabled;
        self
    }

    /// Sets the querier forget delay.
    #[must_use]
    pub const fn with_querier_forget_delay_us(mut self, delay_us: u64) -> Self {
        self.querier_forget_delay_us = delay_us;
        self
    }

    /// Sets the reserved-capacity fraction.
    #[must_use]
    pub fn with_target_reserved_capacity(mut self, fraction: f64) -> Self {
        self.target_reserved_capacity = fraction;
        self
    }

    /// Returns whether utilization-based skip-over is enabled.
    #[must_use]
    pub fn skip_over_enabled(&self) -> bool {
        self.target_reserved_capacity > 0.0
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidConfig` if a value is out of range.
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_tenant_queue_size == 0 {
            return Err(QueueError::InvalidConfig {
                message: "max_tenant_queue_size must be positive".to_string(),
            });
        }

        if !(0.0..1.0).contains(&self.target_reserved_capacity) {
            return Err(QueueError::InvalidConfig {
                message: format!(
                    "target_reserved_capacity must be in [0, 1), got {}",
                    self.target_reserved_capacity
                ),
            });
        }

        self.limits.validate()?;
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_tenant_queue_size: MAX_TENANT_QUEUE_SIZE_DEFAULT,
            additional_queue_dimensions_enabled: false,
            querier_forget_delay_us: 0,
            target_reserved_capacity: TARGET_RESERVED_CAPACITY_DEFAULT,
            limits: Limits::new(),
        }
    }
}
