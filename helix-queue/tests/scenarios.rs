//! End-to-end scheduling scenarios for the queue tree and broker.

use helix_core::{QuerierId, QueuePath, TenantId};
use helix_queue::{
    DequeueContext, QueueBroker, QueueConfig, QueueError, QueuingAlgorithm, RoundRobin,
    SkipOverUtilization, TenantRequest, Tree, INGESTER_DIMENSION, STORE_GATEWAY_DIMENSION,
};

fn connected_broker(
    config: QueueConfig,
    querier: &str,
    connections: usize,
) -> (QueueBroker<u32>, QuerierId) {
    let mut broker = QueueBroker::new(config).expect("valid config");
    let querier_id = QuerierId::from(querier);
    for _ in 0..connections {
        broker.add_querier_connection(&querier_id).expect("querier accepted");
    }
    (broker, querier_id)
}

fn next_payload(
    broker: &mut QueueBroker<u32>,
    querier: &QuerierId,
    waiting_workers: usize,
) -> Option<u32> {
    broker
        .dequeue_for_querier(querier, waiting_workers)
        .expect("querier is active")
        .map(|dequeued| dequeued.request.payload)
}

// -----------------------------------------------------------------------------
// Tree Rotation
// -----------------------------------------------------------------------------

#[test]
fn test_sibling_rotation_end_to_end() {
    let algorithms: Vec<Box<dyn QueuingAlgorithm>> =
        vec![Box::new(RoundRobin), Box::new(SkipOverUtilization), Box::new(RoundRobin)];
    let mut tree = Tree::new(algorithms).unwrap();
    let ctx = DequeueContext::empty();

    let child_1 = QueuePath::from(vec!["root-child", "child-1"]);
    let child_2 = QueuePath::from(vec!["root-child", "child-2"]);
    let child_3 = QueuePath::from(vec!["root-child", "child-3"]);

    tree.enqueue_back(&child_1, "obj-1").unwrap();
    tree.enqueue_back(&child_2, "obj-2").unwrap();
    tree.enqueue_back(&child_3, "obj-3").unwrap();
    tree.enqueue_back(&child_3, "obj-4").unwrap();
    tree.enqueue_back(&child_2, "obj-5").unwrap();
    tree.enqueue_back(&child_1, "obj-6").unwrap();

    let expected = [
        ("obj-1", &child_1),
        ("obj-2", &child_2),
        ("obj-3", &child_3),
        ("obj-6", &child_1),
        ("obj-5", &child_2),
    ];
    for (item, path) in expected {
        let (dequeued_path, dequeued) = tree.dequeue(&ctx).unwrap();
        assert_eq!(dequeued, item);
        assert_eq!(&dequeued_path, path);
    }

    tree.enqueue_back(&child_1, "obj-7").unwrap();
    assert_eq!(tree.dequeue(&ctx).map(|(_, item)| item), Some("obj-4"));
    assert_eq!(tree.dequeue(&ctx).map(|(_, item)| item), Some("obj-7"));

    assert!(tree.dequeue(&ctx).is_none());
    assert!(tree.is_empty());
    assert!(tree.get_node(&QueuePath::from(vec!["root-child"])).is_none());
}

#[test]
fn test_drained_node_rejoins_at_next_turn() {
    let algorithms: Vec<Box<dyn QueuingAlgorithm>> = vec![Box::new(RoundRobin), Box::new(RoundRobin)];
    let mut tree = Tree::new(algorithms).unwrap();
    let ctx = DequeueContext::empty();

    let a = QueuePath::from(vec!["a"]);
    let b = QueuePath::from(vec!["b"]);
    let c = QueuePath::from(vec!["c"]);
    tree.enqueue_back(&a, "a-1").unwrap();
    tree.enqueue_back(&b, "b-1").unwrap();
    tree.enqueue_back(&c, "c-1").unwrap();
    tree.enqueue_back(&b, "b-2").unwrap();
    tree.enqueue_back(&c, "c-2").unwrap();

    assert_eq!(tree.dequeue(&ctx).map(|(_, item)| item), Some("a-1"));
    assert!(tree.get_node(&a).is_none());

    // Not served immediately and not dropped: after b and c.
    tree.enqueue_back(&a, "a-2").unwrap();

    let order: Vec<_> = std::iter::from_fn(|| tree.dequeue(&ctx).map(|(_, item)| item)).collect();
    assert_eq!(order, vec!["b-1", "c-1", "a-2", "b-2", "c-2"]);
}

// -----------------------------------------------------------------------------
// Tenant Fairness
// -----------------------------------------------------------------------------

#[test]
fn test_tenants_served_in_first_seen_order() {
    let (mut broker, querier) = connected_broker(QueueConfig::for_testing(), "querier-1", 1);

    for tenant in ["team-a", "team-b", "team-c"] {
        broker.enqueue_back(TenantRequest::new(tenant, 1), 0).unwrap();
    }
    // Later arrivals in a different order do not reorder the rotation.
    for tenant in ["team-c", "team-b", "team-a"] {
        broker.enqueue_back(TenantRequest::new(tenant, 2), 0).unwrap();
    }

    let mut tenants = Vec::new();
    while let Some(dequeued) = broker.dequeue_for_querier(&querier, 0).unwrap() {
        tenants.push(dequeued.tenant_id().to_string());
    }
    assert_eq!(
        tenants,
        vec!["team-a", "team-b", "team-c", "team-a", "team-b", "team-c"]
    );
    assert_eq!(broker.tenant_count(), 0);
}

#[test]
fn test_backlog_enforcement() {
    let config = QueueConfig::for_testing().with_max_tenant_queue_size(3);
    let (mut broker, querier) = connected_broker(config, "querier-1", 1);

    for payload in 0..3 {
        broker
            .enqueue_back(TenantRequest::new("team-a", payload).with_dimension(INGESTER_DIMENSION), 0)
            .unwrap();
    }

    let err = broker
        .enqueue_back(TenantRequest::new("team-a", 3).with_dimension(STORE_GATEWAY_DIMENSION), 0)
        .unwrap_err();
    match err {
        QueueError::TooManyRequests {
            tenant_id,
            queue_size,
            max_size,
        } => {
            assert_eq!(tenant_id, TenantId::from("team-a"));
            assert_eq!(queue_size, 3);
            assert_eq!(max_size, 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    // A failed dispatch is restored at the head regardless of the limit.
    let dequeued = broker.dequeue_for_querier(&querier, 0).unwrap().unwrap();
    broker
        .enqueue_back(TenantRequest::new("team-a", 4).with_dimension(INGESTER_DIMENSION), 0)
        .unwrap();
    broker.enqueue_front(dequeued.request, 0).unwrap();
    assert_eq!(broker.tenant_queue_len(&TenantId::from("team-a")), 4);
    assert_eq!(next_payload(&mut broker, &querier, 0), Some(0));
}

// -----------------------------------------------------------------------------
// Query-Component Utilization
// -----------------------------------------------------------------------------

/// Ten worker connections, 40% reserved, six ingester requests in flight.
fn broker_with_busy_ingesters() -> (QueueBroker<u32>, QuerierId) {
    let config = QueueConfig::for_testing().with_target_reserved_capacity(0.4);
    let (mut broker, querier) = connected_broker(config, "querier-1", 10);
    for _ in 0..6 {
        broker.mark_request_sent(INGESTER_DIMENSION);
    }

    broker
        .enqueue_back(TenantRequest::new("team-a", 1).with_dimension(INGESTER_DIMENSION), 0)
        .unwrap();
    broker
        .enqueue_back(TenantRequest::new("team-a", 2).with_dimension(STORE_GATEWAY_DIMENSION), 0)
        .unwrap();
    (broker, querier)
}

#[test]
fn test_busy_component_skipped_under_contention() {
    let (mut broker, querier) = broker_with_busy_ingesters();

    // One waiting worker, two queued requests: capacity must be protected.
    assert_eq!(next_payload(&mut broker, &querier, 1), Some(2));
    assert_eq!(next_payload(&mut broker, &querier, 1), Some(1));
}

#[test]
fn test_busy_component_served_with_idle_workers() {
    let (mut broker, querier) = broker_with_busy_ingesters();

    // More waiting workers than queued requests: no need to reserve.
    assert_eq!(next_payload(&mut broker, &querier, 3), Some(1));
    assert_eq!(next_payload(&mut broker, &querier, 3), Some(2));
}

#[test]
fn test_below_threshold_not_skipped() {
    let config = QueueConfig::for_testing().with_target_reserved_capacity(0.4);
    let (mut broker, querier) = connected_broker(config, "querier-1", 10);
    for _ in 0..5 {
        broker.mark_request_sent(INGESTER_DIMENSION);
    }
    broker
        .enqueue_back(TenantRequest::new("team-a", 1).with_dimension(INGESTER_DIMENSION), 0)
        .unwrap();
    broker
        .enqueue_back(TenantRequest::new("team-a", 2).with_dimension(STORE_GATEWAY_DIMENSION), 0)
        .unwrap();

    assert_eq!(next_payload(&mut broker, &querier, 0), Some(1));
}

#[test]
fn test_all_components_busy_still_dequeues() {
    let (mut broker, querier) = broker_with_busy_ingesters();
    for _ in 0..6 {
        broker.mark_request_sent(STORE_GATEWAY_DIMENSION);
    }

    // Both over threshold: the first skipped component is served.
    assert_eq!(next_payload(&mut broker, &querier, 0), Some(1));
    assert_eq!(next_payload(&mut broker, &querier, 0), Some(2));
    assert_eq!(next_payload(&mut broker, &querier, 0), None);
}

#[test]
fn test_skip_over_disabled_with_zero_reserve() {
    let config = QueueConfig::for_testing().with_target_reserved_capacity(0.0);
    let (mut broker, querier) = connected_broker(config, "querier-1", 10);
    for _ in 0..9 {
        broker.mark_request_sent(INGESTER_DIMENSION);
    }
    broker
        .enqueue_back(TenantRequest::new("team-a", 1).with_dimension(INGESTER_DIMENSION), 0)
        .unwrap();
    broker
        .enqueue_back(TenantRequest::new("team-a", 2).with_dimension(STORE_GATEWAY_DIMENSION), 0)
        .unwrap();

    assert_eq!(next_payload(&mut broker, &querier, 0), Some(1));
}

// -----------------------------------------------------------------------------
// Shuffle Sharding
// -----------------------------------------------------------------------------

#[test]
fn test_shuffle_shard_is_stable() {
    let tenant = TenantId::from("team-a");
    let mut shards = Vec::new();

    for _ in 0..2 {
        let mut broker: QueueBroker<u32> = QueueBroker::new(QueueConfig::for_testing()).unwrap();
        for i in 0..8 {
            broker
                .add_querier_connection(&QuerierId::new(format!("querier-{i}")))
                .unwrap();
        }
        broker.enqueue_back(TenantRequest::new("team-a", 1), 3).unwrap();
        broker.enqueue_back(TenantRequest::new("team-a", 2), 3).unwrap();
        shards.push(broker.assignments().queriers_for_tenant(&tenant).cloned().unwrap());
    }

    assert_eq!(shards[0].len(), 3);
    assert_eq!(shards[0], shards[1]);
}

#[test]
fn test_queriers_outside_shard_get_nothing() {
    let mut broker: QueueBroker<u32> = QueueBroker::new(QueueConfig::for_testing()).unwrap();
    let queriers: Vec<QuerierId> = (0..3).map(|i| QuerierId::new(format!("querier-{i}"))).collect();
    for querier in &queriers {
        broker.add_querier_connection(querier).unwrap();
    }

    broker.enqueue_back(TenantRequest::new("small", 1), 1).unwrap();
    broker.enqueue_back(TenantRequest::new("big", 2), 0).unwrap();

    let shard = broker
        .assignments()
        .queriers_for_tenant(&TenantId::from("small"))
        .cloned()
        .unwrap();
    let outsider = queriers.iter().find(|querier| !shard.contains(*querier)).unwrap();

    // The outsider passes over the small tenant and only sees the big one.
    assert_eq!(next_payload(&mut broker, outsider, 0), Some(2));
    assert_eq!(next_payload(&mut broker, outsider, 0), None);
    assert_eq!(broker.len(), 1);
}

// -----------------------------------------------------------------------------
// Querier Lifecycle
// -----------------------------------------------------------------------------

#[test]
fn test_forget_delay() {
    let config = QueueConfig::for_testing().with_querier_forget_delay_us(1_000_000);
    let (mut broker, querier) = connected_broker(config, "querier-1", 1);

    assert!(!broker.remove_querier_connection(&querier, 5_000_000));
    assert!(broker.assignments().contains_querier(&querier));

    // Disconnected queriers cannot dequeue during the grace period.
    assert!(matches!(
        broker.dequeue_for_querier(&querier, 0),
        Err(QueueError::QuerierShuttingDown { .. })
    ));

    assert!(!broker.forget_disconnected_queriers(5_999_999));
    assert!(broker.assignments().contains_querier(&querier));

    assert!(broker.forget_disconnected_queriers(6_000_000));
    assert!(!broker.assignments().contains_querier(&querier));
}

#[test]
fn test_graceful_shutdown_stops_dispatch() {
    let (mut broker, querier) = connected_broker(QueueConfig::for_testing(), "querier-1", 2);
    broker.enqueue_back(TenantRequest::new("team-a", 1), 0).unwrap();

    assert!(broker.notify_querier_shutdown(&querier));
    assert!(matches!(
        broker.dequeue_for_querier(&querier, 0),
        Err(QueueError::QuerierShuttingDown { .. })
    ));

    // Remaining connections close; the last one removes the querier.
    assert!(!broker.remove_querier_connection(&querier, 0));
    assert!(broker.remove_querier_connection(&querier, 0));
    assert_eq!(broker.assignments().querier_count(), 0);
    assert_eq!(broker.len(), 1);
}
