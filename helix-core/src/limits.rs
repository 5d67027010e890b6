//! Bounds on caller-supplied scheduler input.
//!
//! Tenant and querier registries are keyed by strings that arrive over the
//! wire, so each registry and each ID has an explicit ceiling.

use crate::types::{QuerierId, QueuePath, TenantId};

/// System-wide limits for the query scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of tree levels (root included).
    pub max_tree_depth: u32,
    /// Maximum number of routing dimensions appended after the tenant.
    pub max_queue_dimensions: u32,
    /// Maximum length of a tenant ID in bytes.
    pub max_tenant_id_bytes: u32,
    /// Maximum length of a querier ID in bytes.
    pub max_querier_id_bytes: u32,
    /// Maximum number of tenants with queued requests.
    pub max_tenants: u32,
    /// Maximum number of registered queriers.
    pub max_queriers: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Root, tenant and one routing dimension level.
            max_tree_depth: 3,
            max_queue_dimensions: 1,

            // IDs: 256 bytes is well beyond any real tenant or host name.
            max_tenant_id_bytes: 256,
            max_querier_id_bytes: 256,

            // Registries: 100k tenants, 10k queriers.
            max_tenants: 100_000,
            max_queriers: 10_000,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limits are invalid or inconsistent.
    pub fn validate(&self) -> crate::Result<()> {
        // A tree needs at least a root and a tenant level.
        if self.max_tree_depth < 2 {
            return Err(crate::Error::InvalidLimit {
                name: "max_tree_depth",
                reason: "must be >= 2",
            });
        }

        // Tenant plus dimensions must fit below the root.
        if self.max_queue_dimensions + 2 > self.max_tree_depth {
            return Err(crate::Error::InvalidLimit {
                name: "max_queue_dimensions",
                reason: "must be <= max_tree_depth - 2",
            });
        }

        if self.max_tenant_id_bytes == 0 || self.max_querier_id_bytes == 0 {
            return Err(crate::Error::InvalidLimit {
                name: "max_id_bytes",
                reason: "must be positive",
            });
        }

        if self.max_tenants == 0 || self.max_queriers == 0 {
            return Err(crate::Error::InvalidLimit {
                name: "max_tenants",
                reason: "registries must allow at least one entry",
            });
        }

        Ok(())
    }

    /// Validates a tenant ID against these limits.
    ///
    /// # Errors
    /// Returns an error if the ID is empty or too long.
    pub fn check_tenant_id(&self, tenant_id: &TenantId) -> crate::Result<()> {
        check_id("tenant", self.max_tenant_id_bytes, tenant_id.as_str())
    }

    /// Validates a querier ID against these limits.
    ///
    /// # Errors
    /// Returns an error if the ID is empty or too long.
    pub fn check_querier_id(&self, querier_id: &QuerierId) -> crate::Result<()> {
        check_id("querier", self.max_querier_id_bytes, querier_id.as_str())
    }

    /// Validates a tenant queue path: tenant segment plus bounded dimensions.
    ///
    /// # Errors
    /// Returns an error if the path has too many dimensions.
    pub fn check_queue_path(&self, path: &QueuePath) -> crate::Result<()> {
        let dimensions = path.len().saturating_sub(1);
        if dimensions > self.max_queue_dimensions as usize {
            return Err(crate::Error::TooManyDimensions {
                max: self.max_queue_dimensions,
                actual: dimensions,
            });
        }
        Ok(())
    }
}

fn check_id(kind: &'static str, max_bytes: u32, id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::EmptyId { kind });
    }
    if id.len() > max_bytes as usize {
        return Err(crate::Error::IdTooLong {
            kind,
            max_bytes,
            actual_bytes: id.len(),
        });
    }
    Ok(())
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
