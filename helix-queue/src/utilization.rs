//! Query-component utilization tracking.
//!
//! Queriers fan each request out to one of two downstream components: the
//! ingesters (recent data) or the store-gateways (historical blocks). When one
//! component degrades, requests touching it hold querier-worker connections
//! for longer and can starve requests for the healthy component. This module
//! counts in-flight requests per component and decides when a component has
//! eaten into the capacity reserved for the others.

use crate::error::{QueueError, QueueResult};

/// Routing dimension for requests served only by ingesters.
pub const INGESTER_DIMENSION: &str = "ingester";

/// Routing dimension for requests served only by store-gateways.
pub const STORE_GATEWAY_DIMENSION: &str = "store-gateway";

/// Routing dimension for requests served by both components.
pub const INGESTER_AND_STORE_GATEWAY_DIMENSION: &str = "ingester-and-store-gateway";

/// A downstream component a query request reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryComponent {
    /// Ingesters serving recent, not yet compacted data.
    Ingester,
    /// Store-gateways serving long-term block storage.
    StoreGateway,
}

impl QueryComponent {
    /// Returns the routing dimension name for this component.
    #[must_use]
    pub const fn dimension(self) -> &'static str {
        match self {
            Self::Ingester => INGESTER_DIMENSION,
            Self::StoreGateway => STORE_GATEWAY_DIMENSION,
        }
    }
}

/// Which components a routing dimension name refers to, as `(ingester, store_gateway)`.
///
/// Names outside the recognized set match neither component.
#[must_use]
pub fn query_component_flags(name: &str) -> (bool, bool) {
    match name {
        INGESTER_DIMENSION => (true, false),
        STORE_GATEWAY_DIMENSION => (false, true),
        INGESTER_AND_STORE_GATEWAY_DIMENSION => (true, true),
        _ => (false, false),
    }
}

/// In-flight request counters per query component.
#[derive(Debug, Clone)]
pub struct QueryComponentUtilization {
    /// Fraction of connected workers to keep free for other components.
    target_reserved_capacity: f64,

    /// Requests in flight that read from ingesters.
    ingester_inflight_requests: usize,

    /// Requests in flight that read from store-gateways.
    store_gateway_inflight_requests: usize,

    /// All requests in flight to queriers.
    querier_inflight_requests: usize,
}

impl QueryComponentUtilization {
    /// Creates a tracker with the given reserved-capacity fraction.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidConfig` if the fraction is outside `[0, 1)`.
    pub fn new(target_reserved_capacity: f64) -> QueueResult<Self> {
        if !(0.0..1.0).contains(&target_reserved_capacity) {
            return Err(QueueError::InvalidConfig {
                message: format!(
                    "target_reserved_capacity must be in [0, 1), got {target_reserved_capacity}"
                ),
            });
        }

        Ok(Self {
            target_reserved_capacity,
            ingester_inflight_requests: 0,
            store_gateway_inflight_requests: 0,
            querier_inflight_requests: 0,
        })
    }

    /// Returns the configured reserved-capacity fraction.
    #[must_use]
    pub const fn target_reserved_capacity(&self) -> f64 {
        self.target_reserved_capacity
    }

    /// Records that a request for the named component was handed to a querier.
    pub fn mark_request_sent(&mut self, component_name: &str) {
        let (is_ingester, is_store_gateway) = query_component_flags(component_name);
        if is_ingester {
            self.ingester_inflight_requests += 1;
        }
        if is_store_gateway {
            self.store_gateway_inflight_requests += 1;
        }
        self.querier_inflight_requests += 1;
    }

    /// Records that a request for the named component finished.
    pub fn mark_request_completed(&mut self, component_name: &str) {
        let (is_ingester, is_store_gateway) = query_component_flags(component_name);
        if is_ingester {
            self.ingester_inflight_requests = self.ingester_inflight_requests.saturating_sub(1);
        }
        if is_store_gateway {
            self.store_gateway_inflight_requests =
                self.store_gateway_inflight_requests.saturating_sub(1);
        }
        self.querier_inflight_requests = self.querier_inflight_requests.saturating_sub(1);
    }

    /// Returns the in-flight count for a component.
    #[must_use]
    pub const fn inflight_requests(&self, component: QueryComponent) -> usize {
        match component {
            QueryComponent::Ingester => self.ingester_inflight_requests,
            QueryComponent::StoreGateway => self.store_gateway_inflight_requests,
        }
    }

    /// Returns the total number of requests in flight to queriers.
    #[must_use]
    pub const fn querier_inflight_requests(&self) -> usize {
        self.querier_inflight_requests
    }
}

/// Decides whether a dequeue should avoid a query component.
pub trait UtilizationCheck {
    /// Returns false when querier workers are idle enough that no capacity
    /// needs reserving; the threshold is not consulted in that case.
    fn trigger_utilization_check(&self) -> bool;

    /// Returns whether the component named by a routing dimension is using
    /// connections that are reserved for the other components.
    fn exceeds_threshold_for_component_name(&self, name: &str) -> (bool, Option<QueryComponent>);
}

/// Utilization check against a snapshot of querier-worker pressure.
#[derive(Debug, Clone, Copy)]
pub struct ReserveConnections<'a> {
    /// In-flight counters.
    pub utilization: &'a QueryComponentUtilization,
    /// Querier-worker connections currently open.
    pub connected_workers: usize,
    /// Querier workers currently waiting for a request.
    pub waiting_workers: usize,
    /// Requests currently queued.
    pub queue_len: usize,
}

impl ReserveConnections<'_> {
    /// Minimum number of connections to keep free for other components.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn min_reserved_connections(&self) -> usize {
        let target = self.utilization.target_reserved_capacity;
        if target <= 0.0 {
            return 0;
        }
        // At least one connection even when workers * fraction rounds below one.
        (target * self.connected_workers as f64).max(1.0).ceil() as usize
    }

    fn exceeds(&self, component: QueryComponent, min_reserved: usize) -> bool {
        let inflight = self.utilization.inflight_requests(component);
        self.connected_workers.saturating_sub(inflight) <= min_reserved
    }
}

impl UtilizationCheck for ReserveConnections<'_> {
    fn trigger_utilization_check(&self) -> bool {
        self.waiting_workers <= self.queue_len
    }

    fn exceeds_threshold_for_component_name(&self, name: &str) -> (bool, Option<QueryComponent>) {
        // A single worker has nothing to reserve.
        if self.connected_workers <= 1 {
            return (false, None);
        }

        let min_reserved = self.min_reserved_connections();
        let (is_ingester, is_store_gateway) = query_component_flags(name);

        if is_ingester && self.exceeds(QueryComponent::Ingester, min_reserved) {
            return (true, Some(QueryComponent::Ingester));
        }
        if is_store_gateway && self.exceeds(QueryComponent::StoreGateway, min_reserved) {
            return (true, Some(QueryComponent::StoreGateway));
        }
        (false, None)
    }
}
