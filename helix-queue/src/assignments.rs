//! Tenant-to-querier shuffle-shard assignments.
//!
//! Each tenant may be limited to a subset of the connected queriers, so one
//! tenant's load can only ever occupy its own shard. Subsets are drawn from a
//! generator seeded with the tenant ID: the same tenant maps to the same
//! queriers for as long as the querier population is unchanged.
//!
//! Querier lifecycle:
//!
//! - A querier joins the pool on its first connection.
//! - A querier that announces shutdown leaves the pool immediately.
//! - A querier whose last connection closes keeps its slot for the forget
//!   delay, so a quick reconnect does not reshuffle every tenant.

use std::collections::{BTreeSet, HashMap};

use helix_core::{Limits, QuerierId, TenantId};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::QueueResult;

/// Per-tenant shard configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueTenant {
    /// Shard width; zero means every querier.
    max_queriers: usize,
}

/// Connection state of one querier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct QuerierConnection {
    /// Open worker connections.
    connections: usize,
    /// Set once the querier announced a graceful shutdown.
    shutting_down: bool,
    /// When the last connection closed, while in the forget grace period.
    disconnected_at_us: Option<u64>,
}

/// Tenant and querier bookkeeping plus the shuffle-shard mapping between them.
#[derive(Debug, Clone)]
pub struct TenantQuerierAssignments {
    tenants: HashMap<TenantId, QueueTenant>,
    /// Eligible queriers per tenant; `None` means every querier.
    tenant_queriers: HashMap<TenantId, Option<BTreeSet<QuerierId>>>,
    queriers: HashMap<QuerierId, QuerierConnection>,
    forget_delay_us: u64,
    limits: Limits,
}

impl TenantQuerierAssignments {
    /// Creates empty assignments.
    #[must_use]
    pub fn new(forget_delay_us: u64, limits: Limits) -> Self {
        Self {
            tenants: HashMap::new(),
            tenant_queriers: HashMap::new(),
            queriers: HashMap::new(),
            forget_delay_us,
            limits,
        }
    }

    /// Registers a tenant, or updates its shard width.
    ///
    /// The tenant's querier subset is recomputed when the tenant is new or
    /// its width changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant ID is invalid or the tenant limit is reached.
    pub fn create_or_update_tenant(
        &mut self,
        tenant_id: &TenantId,
        max_queriers: usize,
    ) -> QueueResult<()> {
        self.limits.check_tenant_id(tenant_id)?;

        if let Some(tenant) = self.tenants.get_mut(tenant_id) {
            if tenant.max_queriers == max_queriers {
                return Ok(());
            }
            tenant.max_queriers = max_queriers;
        } else {
            if self.tenants.len() >= self.limits.max_tenants as usize {
                return Err(helix_core::Error::RegistryFull {
                    registry: "tenants",
                    max: self.limits.max_tenants,
                }
                .into());
            }
            self.tenants
                .insert(tenant_id.clone(), QueueTenant { max_queriers });
        }

        let pool = self.querier_pool();
        let shard = shuffle_shard(tenant_id, max_queriers, &pool);
        debug!(
            tenant = %tenant_id,
            max_queriers,
            shard_size = shard.as_ref().map_or(pool.len(), BTreeSet::len),
            "tenant shard updated"
        );
        self.tenant_queriers.insert(tenant_id.clone(), shard);
        Ok(())
    }

    /// Forgets a tenant that no longer has queued requests.
    pub fn remove_tenant(&mut self, tenant_id: &TenantId) {
        if self.tenants.remove(tenant_id).is_some() {
            debug!(tenant = %tenant_id, "tenant removed");
        }
        self.tenant_queriers.remove(tenant_id);
    }

    /// Records a new worker connection from a querier.
    ///
    /// Returns true if the querier (re)joined the pool and tenants were resharded.
    ///
    /// # Errors
    ///
    /// Returns an error if the querier ID is invalid or the querier limit is reached.
    pub fn add_querier_connection(&mut self, querier_id: &QuerierId) -> QueueResult<bool> {
        if let Some(querier) = self.queriers.get_mut(querier_id) {
            querier.connections += 1;
            // Reconnected within the forget delay.
            querier.disconnected_at_us = None;

            if !querier.shutting_down {
                return Ok(false);
            }
            querier.shutting_down = false;
            debug!(querier = %querier_id, "querier rejoined after shutdown notice");
            self.reshard_all();
            return Ok(true);
        }

        self.limits.check_querier_id(querier_id)?;
        if self.queriers.len() >= self.limits.max_queriers as usize {
            return Err(helix_core::Error::RegistryFull {
                registry: "queriers",
                max: self.limits.max_queriers,
            }
            .into());
        }

        self.queriers.insert(
            querier_id.clone(),
            QuerierConnection {
                connections: 1,
                ..QuerierConnection::default()
            },
        );
        debug!(querier = %querier_id, "querier connected");
        self.reshard_all();
        Ok(true)
    }

    /// Records a closed worker connection.
    ///
    /// When the last connection closes the querier is either removed at once
    /// (it was shutting down, or there is no forget delay) or stamped with the
    /// disconnect time. Returns true if tenants were resharded.
    pub fn remove_querier_connection(&mut self, querier_id: &QuerierId, now_us: u64) -> bool {
        let forget_delay_us = self.forget_delay_us;
        let Some(querier) = self.queriers.get_mut(querier_id) else {
            debug!(querier = %querier_id, "connection closed for unknown querier");
            return false;
        };

        querier.connections = querier.connections.saturating_sub(1);
        if querier.connections > 0 {
            return false;
        }

        if querier.shutting_down || forget_delay_us == 0 {
            self.queriers.remove(querier_id);
            debug!(querier = %querier_id, "querier removed after last connection closed");
            self.reshard_all();
            return true;
        }

        querier.disconnected_at_us = Some(now_us);
        debug!(querier = %querier_id, now_us, "querier disconnected, waiting forget delay");
        false
    }

    /// Handles a querier's graceful-shutdown notice.
    ///
    /// The querier stops being assigned to tenants immediately. Returns true
    /// if tenants were resharded.
    pub fn notify_querier_shutdown(&mut self, querier_id: &QuerierId) -> bool {
        let Some(querier) = self.queriers.get_mut(querier_id) else {
            return false;
        };

        if querier.connections == 0 {
            self.queriers.remove(querier_id);
            debug!(querier = %querier_id, "querier shut down with no open connections");
        } else {
            querier.shutting_down = true;
            debug!(
                querier = %querier_id,
                connections = querier.connections,
                "querier shutting down"
            );
        }
        self.reshard_all();
        true
    }

    /// Purges queriers whose forget delay has elapsed without a reconnect.
    ///
    /// Returns true if any querier was purged and tenants were resharded.
    pub fn forget_disconnected_queriers(&mut self, now_us: u64) -> bool {
        if self.forget_delay_us == 0 {
            return false;
        }

        let forget_delay_us = self.forget_delay_us;
        let expired: Vec<QuerierId> = self
            .queriers
            .iter()
            .filter(|(_, querier)| {
                querier.connections == 0
                    && querier
                        .disconnected_at_us
                        .is_some_and(|at| at.saturating_add(forget_delay_us) <= now_us)
            })
            .map(|(querier_id, _)| querier_id.clone())
            .collect();

        if expired.is_empty() {
            return false;
        }

        for querier_id in &expired {
            self.queriers.remove(querier_id);
            debug!(querier = %querier_id, now_us, "forgot disconnected querier");
        }
        self.reshard_all();
        true
    }

    /// Returns true if a tenant's requests may be served by the querier.
    ///
    /// Tenants without a recorded shard are open to every querier.
    #[must_use]
    pub fn is_tenant_eligible(&self, tenant_id: &str, querier_id: &QuerierId) -> bool {
        match self.tenant_queriers.get(tenant_id) {
            Some(Some(queriers)) => queriers.contains(querier_id),
            Some(None) | None => true,
        }
    }

    /// Returns the tenant's querier subset, or `None` if every querier is eligible.
    #[must_use]
    pub fn queriers_for_tenant(&self, tenant_id: &TenantId) -> Option<&BTreeSet<QuerierId>> {
        self.tenant_queriers.get(tenant_id).and_then(Option::as_ref)
    }

    /// Returns the tenant's configured shard width.
    #[must_use]
    pub fn tenant_max_queriers(&self, tenant_id: &TenantId) -> Option<usize> {
        self.tenants.get(tenant_id).map(|tenant| tenant.max_queriers)
    }

    /// Returns true if the querier has an open connection and is not shutting down.
    #[must_use]
    pub fn is_querier_active(&self, querier_id: &QuerierId) -> bool {
        self.queriers
            .get(querier_id)
            .is_some_and(|querier| querier.connections > 0 && !querier.shutting_down)
    }

    /// Returns true if the querier is known, including during its forget delay.
    #[must_use]
    pub fn contains_querier(&self, querier_id: &QuerierId) -> bool {
        self.queriers.contains_key(querier_id)
    }

    /// Returns the total number of open querier-worker connections.
    #[must_use]
    pub fn connected_workers(&self) -> usize {
        self.queriers.values().map(|querier| querier.connections).sum()
    }

    /// Returns the number of known queriers.
    #[must_use]
    pub fn querier_count(&self) -> usize {
        self.queriers.len()
    }

    /// Returns the number of registered tenants.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Sorted queriers eligible for shard assignment.
    fn querier_pool(&self) -> Vec<QuerierId> {
        let mut pool: Vec<QuerierId> = self
            .queriers
            .iter()
            .filter(|(_, querier)| !querier.shutting_down)
            .map(|(querier_id, _)| querier_id.clone())
            .collect();
        pool.sort();
        pool
    }

    fn reshard_all(&mut self) {
        let pool = self.querier_pool();
        for (tenant_id, tenant) in &self.tenants {
            let shard = shuffle_shard(tenant_id, tenant.max_queriers, &pool);
            self.tenant_queriers.insert(tenant_id.clone(), shard);
        }
        debug!(
            tenants = self.tenants.len(),
            queriers = pool.len(),
            "resharded tenants"
        );
    }
}

/// Draws a tenant's querier subset from a sorted pool.
///
/// Returns `None` when the tenant may use every querier.
fn shuffle_shard(
    tenant_id: &TenantId,
    max_queriers: usize,
    pool: &[QuerierId],
) -> Option<BTreeSet<QuerierId>> {
    if max_queriers == 0 || max_queriers >= pool.len() {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(xxh3_64(tenant_id.as_str().as_bytes()));
    Some(pool.choose_multiple(&mut rng, max_queriers).cloned().collect())
}
