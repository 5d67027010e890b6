//! Tenant-fair request queueing for the query scheduler.
//!
//! This crate holds the scheduling core that sits between query frontends
//! and querier workers:
//!
//! - **Queue tree**: requests are queued under `tenant/dimension` paths in a
//!   tree whose nodes are created on demand and dropped once drained.
//! - **Queuing algorithms**: each tree depth has its own selection policy
//!   (round-robin, shuffle-shard tenant selection, utilization skip-over).
//! - **Shuffle sharding**: each tenant is served by a deterministic subset of
//!   the connected queriers.
//! - **Query-component utilization**: requests for an overloaded downstream
//!   component are deferred so the other component keeps reserved capacity.
//!
//! # Architecture
//!
//! ```text
//!                    QueueBroker
//!                         │
//!   root       (TenantShuffleShard)  ◀── TenantQuerierAssignments
//!     ├── team-a      (SkipOverUtilization)  ◀── QueryComponentUtilization
//!     │     ├── ingester       (RoundRobin)
//!     │     └── store-gateway  (RoundRobin)
//!     └── team-b
//!           └── ...
//! ```
//!
//! # DST Compatibility
//!
//! Nothing here reads a clock or blocks. Operations that depend on time take
//! `now_us` as a parameter, so tests control time completely.
//!
//! # Example
//!
//! ```rust
//! use helix_core::QuerierId;
//! use helix_queue::{QueueBroker, QueueConfig, TenantRequest};
//!
//! let mut broker = QueueBroker::new(QueueConfig::for_testing()).unwrap();
//! let querier = QuerierId::from("querier-1");
//! broker.add_querier_connection(&querier).unwrap();
//!
//! broker
//!     .enqueue_back(TenantRequest::new("team-a", "query").with_dimension("ingester"), 0)
//!     .unwrap();
//!
//! let dequeued = broker.dequeue_for_querier(&querier, 0).unwrap().unwrap();
//! assert_eq!(dequeued.request.payload, "query");
//! ```

#![warn(missing_docs)]

pub mod algorithm;
pub mod assignments;
pub mod broker;
pub mod config;
pub mod error;
pub mod tree;
pub mod utilization;

// Re-export main types for convenience.
pub use algorithm::{
    DequeueContext, QueuingAlgorithm, RoundRobin, Rotation, Selection, SkipOverUtilization,
    TenantShuffleShard,
};
pub use assignments::TenantQuerierAssignments;
pub use broker::{BrokerStats, DequeuedRequest, QueueBroker, TenantRequest};
pub use config::{QueueConfig, MAX_TENANT_QUEUE_SIZE_DEFAULT, TARGET_RESERVED_CAPACITY_DEFAULT};
pub use error::{QueueError, QueueResult};
pub use tree::{Node, Tree};
pub use utilization::{
    QueryComponent, QueryComponentUtilization, ReserveConnections, UtilizationCheck,
    INGESTER_AND_STORE_GATEWAY_DIMENSION, INGESTER_DIMENSION, STORE_GATEWAY_DIMENSION,
};
