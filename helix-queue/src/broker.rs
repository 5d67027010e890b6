//! Queue broker.
//!
//! The broker owns the queue tree and keeps it consistent with tenant and
//! querier bookkeeping:
//!
//! - Enqueue registers the tenant (or updates its shard width), builds the
//!   tenant's queue path and enforces the per-tenant backlog limit.
//! - Dequeue runs on behalf of one querier: tenants outside the querier's
//!   shuffle shard are passed over, and query components over their reserved
//!   capacity are deferred.
//! - A tenant whose subtree drains is dropped from the bookkeeping.
//!
//! The broker is single-threaded; callers serialize access to it.

use helix_core::{Position, QuerierId, QueuePath, TenantId};
use tracing::{debug, warn};

use crate::algorithm::{
    DequeueContext, QueuingAlgorithm, RoundRobin, SkipOverUtilization, TenantShuffleShard,
};
use crate::assignments::TenantQuerierAssignments;
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::tree::Tree;
use crate::utilization::{QueryComponent, QueryComponentUtilization, ReserveConnections};

/// A request waiting for a querier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRequest<R> {
    /// The tenant that issued the request.
    pub tenant_id: TenantId,
    /// The request payload.
    pub payload: R,
    /// Routing dimensions below the tenant, such as the query component.
    pub dimensions: Vec<String>,
}

impl<R> TenantRequest<R> {
    /// Creates a request without routing dimensions.
    pub fn new(tenant_id: impl Into<TenantId>, payload: R) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            payload,
            dimensions: Vec::new(),
        }
    }

    /// Adds a routing dimension.
    #[must_use]
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimensions.push(dimension.into());
        self
    }

    /// Returns the query component name used for utilization tracking.
    ///
    /// Requests without routing dimensions count toward no component.
    #[must_use]
    pub fn component_name(&self) -> &str {
        self.dimensions.first().map_or("", String::as_str)
    }
}

/// A request handed to a querier.
#[derive(Debug, Clone)]
pub struct DequeuedRequest<R> {
    /// The request.
    pub request: TenantRequest<R>,
    /// Queue path the request was taken from.
    pub path: QueuePath,
    /// Shared tenant rotation position after this dequeue.
    pub position: Position,
}

impl<R> DequeuedRequest<R> {
    /// Returns the tenant that issued the request.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.request.tenant_id
    }
}

/// Queue broker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Requests currently queued.
    pub queued_requests: usize,
    /// Tenants with queued requests.
    pub tenants: usize,
    /// Known queriers, including those in their forget delay.
    pub queriers: usize,
    /// Open querier-worker connections.
    pub connected_workers: usize,
    /// Requests in flight to ingesters.
    pub ingester_inflight: usize,
    /// Requests in flight to store-gateways.
    pub store_gateway_inflight: usize,
    /// Requests in flight to queriers.
    pub querier_inflight: usize,
    /// Total requests accepted.
    pub total_enqueued: u64,
    /// Total requests handed to queriers.
    pub total_dequeued: u64,
    /// Total requests rejected for exceeding the tenant backlog.
    pub total_rejected: u64,
}

/// Tenant-fair request queue with shuffle sharding and utilization-aware dispatch.
#[derive(Debug)]
pub struct QueueBroker<R> {
    tree: Tree<TenantRequest<R>>,
    assignments: TenantQuerierAssignments,
    utilization: QueryComponentUtilization,
    config: QueueConfig,
    total_enqueued: u64,
    total_dequeued: u64,
    total_rejected: u64,
}

impl<R> QueueBroker<R> {
    /// Creates a broker.
    ///
    /// Tree levels: tenants under a shuffle-shard root, then one level per
    /// routing dimension. The first dimension level defers overloaded query
    /// components when reserved capacity is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;

        let utilization = QueryComponentUtilization::new(config.target_reserved_capacity)?;

        let mut algorithms: Vec<Box<dyn QueuingAlgorithm>> = vec![Box::new(TenantShuffleShard)];
        if config.skip_over_enabled() {
            algorithms.push(Box::new(SkipOverUtilization));
        } else {
            algorithms.push(Box::new(RoundRobin));
        }
        for _ in 0..config.limits.max_queue_dimensions {
            algorithms.push(Box::new(RoundRobin));
        }

        Ok(Self {
            tree: Tree::new(algorithms)?,
            assignments: TenantQuerierAssignments::new(
                config.querier_forget_delay_us,
                config.limits,
            ),
            utilization,
            config,
            total_enqueued: 0,
            total_dequeued: 0,
            total_rejected: 0,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the tenant-querier assignments.
    #[must_use]
    pub const fn assignments(&self) -> &TenantQuerierAssignments {
        &self.assignments
    }

    /// Returns the query-component utilization counters.
    #[must_use]
    pub const fn utilization(&self) -> &QueryComponentUtilization {
        &self.utilization
    }

    /// Returns the queue tree.
    #[must_use]
    pub const fn tree(&self) -> &Tree<TenantRequest<R>> {
        &self.tree
    }

    /// Enqueues a new request behind the tenant's pending requests.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::TooManyRequests` if the tenant's backlog is full,
    /// or an error if the tenant ID or routing dimensions are invalid.
    pub fn enqueue_back(&mut self, request: TenantRequest<R>, max_queriers: usize) -> QueueResult<()> {
        let path = self.make_queue_path(&request)?;
        self.assignments
            .create_or_update_tenant(&request.tenant_id, max_queriers)?;

        let queue_size = self.tenant_queue_len(&request.tenant_id);
        let max_size = self.config.max_tenant_queue_size;
        if queue_size + 1 > max_size {
            self.total_rejected += 1;
            warn!(
                tenant = %request.tenant_id,
                queue_size,
                max_size,
                "rejecting request, tenant queue is full"
            );
            return Err(QueueError::TooManyRequests {
                tenant_id: request.tenant_id,
                queue_size,
                max_size,
            });
        }

        self.tree.enqueue_back(&path, request)?;
        self.total_enqueued += 1;
        Ok(())
    }

    /// Puts a previously dequeued request back at the head of its queue.
    ///
    /// Used when dispatch to a querier failed. The backlog limit is not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant ID or routing dimensions are invalid.
    pub fn enqueue_front(&mut self, request: TenantRequest<R>, max_queriers: usize) -> QueueResult<()> {
        let path = self.make_queue_path(&request)?;
        self.assignments
            .create_or_update_tenant(&request.tenant_id, max_queriers)?;

        debug!(tenant = %request.tenant_id, path = %path, "re-enqueuing request at front");
        self.tree.enqueue_front(&path, request)
    }

    /// Takes the next request the querier may serve.
    ///
    /// `waiting_workers` is the number of querier workers currently blocked
    /// waiting for a request; it decides whether query components need their
    /// reserved capacity protected. Returns `Ok(None)` if no request is
    /// eligible for this querier.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::QuerierShuttingDown` if the querier is unknown,
    /// has no open connection, or announced its shutdown.
    ///
    /// # Panics
    ///
    /// Panics if a request is dequeued for a tenant the broker has no record of.
    pub fn dequeue_for_querier(
        &mut self,
        querier_id: &QuerierId,
        waiting_workers: usize,
    ) -> QueueResult<Option<DequeuedRequest<R>>> {
        if !self.assignments.is_querier_active(querier_id) {
            warn!(querier = %querier_id, "dequeue from inactive querier");
            return Err(QueueError::QuerierShuttingDown {
                querier_id: querier_id.clone(),
            });
        }

        let check = ReserveConnections {
            utilization: &self.utilization,
            connected_workers: self.assignments.connected_workers(),
            waiting_workers,
            queue_len: self.tree.item_count(),
        };
        let ctx = DequeueContext::for_querier(querier_id, &self.assignments).with_utilization(&check);

        let Some((path, request)) = self.tree.dequeue(&ctx) else {
            return Ok(None);
        };
        self.total_dequeued += 1;

        assert!(
            self.assignments
                .tenant_max_queriers(&request.tenant_id)
                .is_some(),
            "dequeued request for unregistered tenant {}",
            request.tenant_id
        );

        if self.tree.get_node(&path.prefix(1)).is_none() {
            debug!(tenant = %request.tenant_id, "tenant queue drained");
            self.assignments.remove_tenant(&request.tenant_id);
        }

        Ok(Some(DequeuedRequest {
            request,
            path,
            position: self.tree.root_position(),
        }))
    }

    /// Records a worker connection from a querier. Returns true if tenants were resharded.
    ///
    /// # Errors
    ///
    /// Returns an error if the querier ID is invalid or the querier limit is reached.
    pub fn add_querier_connection(&mut self, querier_id: &QuerierId) -> QueueResult<bool> {
        self.assignments.add_querier_connection(querier_id)
    }

    /// Records a closed worker connection. Returns true if tenants were resharded.
    pub fn remove_querier_connection(&mut self, querier_id: &QuerierId, now_us: u64) -> bool {
        self.assignments.remove_querier_connection(querier_id, now_us)
    }

    /// Handles a querier's shutdown notice. Returns true if tenants were resharded.
    pub fn notify_querier_shutdown(&mut self, querier_id: &QuerierId) -> bool {
        self.assignments.notify_querier_shutdown(querier_id)
    }

    /// Purges queriers past their forget delay. Returns true if tenants were resharded.
    pub fn forget_disconnected_queriers(&mut self, now_us: u64) -> bool {
        self.assignments.forget_disconnected_queriers(now_us)
    }

    /// Records that a request was handed to a querier.
    pub fn mark_request_sent(&mut self, component_name: &str) {
        self.utilization.mark_request_sent(component_name);
    }

    /// Records that a querier finished a request.
    pub fn mark_request_completed(&mut self, component_name: &str) {
        self.utilization.mark_request_completed(component_name);
    }

    /// Returns the number of queued requests for a tenant.
    #[must_use]
    pub fn tenant_queue_len(&self, tenant_id: &TenantId) -> usize {
        self.tree
            .root()
            .child(tenant_id.as_str())
            .map_or(0, |node| node.item_count())
    }

    /// Returns the total number of queued requests.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.item_count()
    }

    /// Returns true if no requests are queued.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of tenants with queued requests.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.assignments.tenant_count()
    }

    /// Returns broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            queued_requests: self.len(),
            tenants: self.tenant_count(),
            queriers: self.assignments.querier_count(),
            connected_workers: self.assignments.connected_workers(),
            ingester_inflight: self.utilization.inflight_requests(QueryComponent::Ingester),
            store_gateway_inflight: self
                .utilization
                .inflight_requests(QueryComponent::StoreGateway),
            querier_inflight: self.utilization.querier_inflight_requests(),
            total_enqueued: self.total_enqueued,
            total_dequeued: self.total_dequeued,
            total_rejected: self.total_rejected,
        }
    }

    fn make_queue_path(&self, request: &TenantRequest<R>) -> QueueResult<QueuePath> {
        let limits = &self.config.limits;
        limits.check_tenant_id(&request.tenant_id)?;

        let path = if self.config.additional_queue_dimensions_enabled {
            QueuePath::for_tenant(&request.tenant_id, &request.dimensions)
        } else {
            QueuePath::for_tenant(&request.tenant_id, &[])
        };
        limits.check_queue_path(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilization::{INGESTER_DIMENSION, STORE_GATEWAY_DIMENSION};

    fn broker() -> QueueBroker<u32> {
        QueueBroker::new(QueueConfig::for_testing()).unwrap()
    }

    fn connect(broker: &mut QueueBroker<u32>, querier: &str) -> QuerierId {
        let querier_id = QuerierId::from(querier);
        broker.add_querier_connection(&querier_id).unwrap();
        querier_id
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = QueueConfig::for_testing().with_max_tenant_queue_size(0);
        assert!(QueueBroker::<u32>::new(config).is_err());
    }

    #[test]
    fn test_enqueue_and_dequeue() {
        let mut broker = broker();
        let querier = connect(&mut broker, "querier-1");

        broker
            .enqueue_back(TenantRequest::new("team-a", 1).with_dimension(INGESTER_DIMENSION), 0)
            .unwrap();
        assert_eq!(broker.len(), 1);
        assert_eq!(broker.tenant_count(), 1);

        let dequeued = broker.dequeue_for_querier(&querier, 0).unwrap().unwrap();
        assert_eq!(dequeued.request.payload, 1);
        assert_eq!(dequeued.tenant_id().as_str(), "team-a");
        assert_eq!(dequeued.path, QueuePath::from(vec!["team-a", "ingester"]));

        // The drained tenant is forgotten.
        assert!(broker.is_empty());
        assert_eq!(broker.tenant_count(), 0);
        assert!(broker.dequeue_for_querier(&querier, 0).unwrap().is_none());
    }

    #[test]
    fn test_dimensions_ignored_when_disabled() {
        let config = QueueConfig::for_testing().with_additional_queue_dimensions(false);
        let mut broker = QueueBroker::new(config).unwrap();
        let querier = connect(&mut broker, "querier-1");

        broker
            .enqueue_back(TenantRequest::new("team-a", 7).with_dimension(STORE_GATEWAY_DIMENSION), 0)
            .unwrap();
        let dequeued = broker.dequeue_for_querier(&querier, 0).unwrap().unwrap();
        assert_eq!(dequeued.path, QueuePath::from(vec!["team-a"]));
        assert_eq!(dequeued.request.component_name(), STORE_GATEWAY_DIMENSION);
    }

    #[test]
    fn test_too_many_dimensions_rejected() {
        let mut broker = broker();
        let request = TenantRequest::new("team-a", 1)
            .with_dimension("ingester")
            .with_dimension("extra");

        let err = broker.enqueue_back(request, 0).unwrap_err();
        assert!(matches!(err, QueueError::Core(_)));
        // Rejected paths do not register the tenant.
        assert_eq!(broker.tenant_count(), 0);
    }

    #[test]
    fn test_empty_tenant_rejected() {
        let mut broker = broker();
        assert!(broker.enqueue_back(TenantRequest::new("", 1), 0).is_err());
        assert!(broker.is_empty());
    }

    #[test]
    fn test_backlog_limit() {
        let mut broker = QueueBroker::new(QueueConfig::for_testing().with_max_tenant_queue_size(2)).unwrap();

        broker.enqueue_back(TenantRequest::new("team-a", 1), 0).unwrap();
        broker.enqueue_back(TenantRequest::new("team-a", 2), 0).unwrap();
        let err = broker.enqueue_back(TenantRequest::new("team-a", 3), 0).unwrap_err();
        assert!(matches!(
            err,
            QueueError::TooManyRequests { queue_size: 2, max_size: 2, .. }
        ));

        // Other tenants have their own backlog.
        broker.enqueue_back(TenantRequest::new("team-b", 4), 0).unwrap();

        // Front re-enqueue bypasses the limit.
        broker.enqueue_front(TenantRequest::new("team-a", 0), 0).unwrap();
        assert_eq!(broker.tenant_queue_len(&TenantId::from("team-a")), 3);
        assert_eq!(broker.stats().total_rejected, 1);
    }

    #[test]
    fn test_inactive_querier_rejected() {
        let mut broker = broker();
        broker.enqueue_back(TenantRequest::new("team-a", 1), 0).unwrap();

        let unknown = QuerierId::from("querier-x");
        assert!(matches!(
            broker.dequeue_for_querier(&unknown, 0),
            Err(QueueError::QuerierShuttingDown { .. })
        ));

        let querier = connect(&mut broker, "querier-1");
        connect(&mut broker, "querier-1");
        broker.notify_querier_shutdown(&querier);
        assert!(matches!(
            broker.dequeue_for_querier(&querier, 0),
            Err(QueueError::QuerierShuttingDown { .. })
        ));
        assert_eq!(broker.len(), 1);
    }

    #[test]
    fn test_shared_position_advances_across_queriers() {
        let mut broker = broker();
        let querier_1 = connect(&mut broker, "querier-1");
        let querier_2 = connect(&mut broker, "querier-2");

        for tenant in ["team-a", "team-b", "team-c"] {
            broker.enqueue_back(TenantRequest::new(tenant, 1), 0).unwrap();
            broker.enqueue_back(TenantRequest::new(tenant, 2), 0).unwrap();
        }

        let mut tenants = Vec::new();
        for querier in [&querier_1, &querier_2, &querier_1, &querier_2] {
            let dequeued = broker.dequeue_for_querier(querier, 0).unwrap().unwrap();
            tenants.push(dequeued.tenant_id().to_string());
        }
        assert_eq!(tenants, vec!["team-a", "team-b", "team-c", "team-a"]);
    }

    #[test]
    fn test_shuffle_shard_limits_tenant_to_its_queriers() {
        let mut broker = broker();
        let queriers: Vec<QuerierId> = (0..4)
            .map(|i| connect(&mut broker, &format!("querier-{i}")))
            .collect();

        broker.enqueue_back(TenantRequest::new("team-a", 1), 1).unwrap();
        let shard = broker
            .assignments()
            .queriers_for_tenant(&TenantId::from("team-a"))
            .cloned()
            .unwrap();
        assert_eq!(shard.len(), 1);

        for querier in queriers.iter().filter(|querier| !shard.contains(*querier)) {
            assert!(broker.dequeue_for_querier(querier, 0).unwrap().is_none());
        }

        let owner = shard.iter().next().unwrap();
        let dequeued = broker.dequeue_for_querier(owner, 0).unwrap().unwrap();
        assert_eq!(dequeued.request.payload, 1);
    }

    #[test]
    fn test_stats() {
        let mut broker = broker();
        let querier = connect(&mut broker, "querier-1");
        broker
            .enqueue_back(TenantRequest::new("team-a", 1).with_dimension(INGESTER_DIMENSION), 0)
            .unwrap();

        let dequeued = broker.dequeue_for_querier(&querier, 0).unwrap().unwrap();
        broker.mark_request_sent(dequeued.request.component_name());

        let stats = broker.stats();
        assert_eq!(stats.queued_requests, 0);
        assert_eq!(stats.queriers, 1);
        assert_eq!(stats.connected_workers, 1);
        assert_eq!(stats.ingester_inflight, 1);
        assert_eq!(stats.querier_inflight, 1);
        assert_eq!(stats.total_enqueued, 1);
        assert_eq!(stats.total_dequeued, 1);

        broker.mark_request_completed(dequeued.request.component_name());
        assert_eq!(broker.stats().querier_inflight, 0);
    }
}
