//! Helix query scheduler binary.
//!
//! Runs the tenant-fair request queue against a synthetic workload: one
//! producer per tenant enqueues requests routed to ingesters, store-gateways
//! or both, and a pool of querier workers drains them. Queue statistics are
//! logged when the run ends.
//!
//! ```bash
//! helix-scheduler --tenants 8 --queriers 4 --workers-per-querier 4 \
//!     --additional-query-queue-dimensions-enabled --duration-secs 10
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use clap::Parser;
use helix_core::QuerierId;
use helix_queue::{
    QueueConfig, QueueError, TenantRequest, INGESTER_AND_STORE_GATEWAY_DIMENSION,
    INGESTER_DIMENSION, MAX_TENANT_QUEUE_SIZE_DEFAULT, STORE_GATEWAY_DIMENSION,
};
use helix_scheduler::{forget_task, RequestQueue, FORGET_CHECK_INTERVAL_MS};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Long-poll timeout for querier workers (in milliseconds).
const DEQUEUE_TIMEOUT_MS: u64 = 100;

/// Helix query scheduler.
#[derive(Parser, Debug)]
#[command(name = "helix-scheduler")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum number of queued requests per tenant.
    #[arg(long, default_value_t = MAX_TENANT_QUEUE_SIZE_DEFAULT)]
    max_outstanding_requests_per_tenant: usize,

    /// Split each tenant's queue by the query component its requests read from.
    #[arg(long)]
    additional_query_queue_dimensions_enabled: bool,

    /// How long a disconnected querier keeps its shuffle-shard slot (in milliseconds).
    #[arg(long, default_value_t = 0)]
    querier_forget_delay_ms: u64,

    /// Fraction of querier workers reserved for the other query component.
    /// Zero disables utilization-based skip-over.
    #[arg(long, default_value_t = 0.4)]
    query_component_reserved_capacity: f64,

    /// Number of tenants issuing requests.
    #[arg(long, default_value_t = 4)]
    tenants: usize,

    /// Number of querier processes.
    #[arg(long, default_value_t = 3)]
    queriers: usize,

    /// Worker connections opened by each querier.
    #[arg(long, default_value_t = 4)]
    workers_per_querier: usize,

    /// Shuffle-shard width per tenant; zero lets every querier serve every tenant.
    #[arg(long, default_value_t = 0)]
    max_queriers_per_tenant: usize,

    /// Delay between requests from one tenant (in milliseconds).
    #[arg(long, default_value_t = 5)]
    request_interval_ms: u64,

    /// Simulated query execution time (in milliseconds).
    #[arg(long, default_value_t = 20)]
    query_duration_ms: u64,

    /// How long to run the workload (in seconds).
    #[arg(long, default_value_t = 5)]
    duration_secs: u64,

    /// Seed for the synthetic workload.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Args {
    fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_max_tenant_queue_size(self.max_outstanding_requests_per_tenant)
            .with_additional_queue_dimensions(self.additional_query_queue_dimensions_enabled)
            .with_querier_forget_delay_us(self.querier_forget_delay_ms.saturating_mul(1_000))
            .with_target_reserved_capacity(self.query_component_reserved_capacity)
    }
}

/// A synthetic query.
#[derive(Debug)]
struct Query {
    /// Per-tenant sequence number.
    sequence: u64,
}

/// Enqueues requests for one tenant until shutdown.
async fn produce(
    queue: RequestQueue<Query>,
    tenant: String,
    max_queriers: usize,
    interval: Duration,
    seed: u64,
    mut shutdown: watch::Receiver<bool>,
) -> (u64, u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut accepted = 0;
    let mut rejected = 0;
    let mut sequence = 0;

    while !*shutdown.borrow() {
        let component = match rng.gen_range(0..10) {
            0..=4 => INGESTER_DIMENSION,
            5..=8 => STORE_GATEWAY_DIMENSION,
            _ => INGESTER_AND_STORE_GATEWAY_DIMENSION,
        };
        let request = TenantRequest::new(tenant.as_str(), Query { sequence }).with_dimension(component);
        sequence += 1;

        match queue.enqueue(request, max_queriers).await {
            Ok(()) => accepted += 1,
            Err(QueueError::TooManyRequests { .. }) => rejected += 1,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "enqueue failed");
                break;
            }
        }

        tokio::select! {
            _ = shutdown.changed() => {}
            () = tokio::time::sleep(interval) => {}
        }
    }

    (accepted, rejected)
}

/// Serves requests on one querier worker connection until shutdown.
async fn serve(
    queue: RequestQueue<Query>,
    querier_id: QuerierId,
    query_duration: Duration,
    shutdown: watch::Receiver<bool>,
) -> u64 {
    if let Err(e) = queue.register_querier_connection(&querier_id).await {
        warn!(querier = %querier_id, error = %e, "querier connection rejected");
        return 0;
    }

    let mut served = 0;
    while !*shutdown.borrow() {
        match queue
            .dequeue(&querier_id, Duration::from_millis(DEQUEUE_TIMEOUT_MS))
            .await
        {
            Ok(Some(dequeued)) => {
                debug!(
                    querier = %querier_id,
                    tenant = %dequeued.tenant_id(),
                    path = %dequeued.path,
                    sequence = dequeued.request.payload.sequence,
                    "serving request"
                );
                tokio::time::sleep(query_duration).await;
                queue.complete_request(dequeued.request.component_name()).await;
                served += 1;
            }
            Ok(None) => {}
            Err(QueueError::QuerierShuttingDown { .. }) => break,
            Err(e) => {
                warn!(querier = %querier_id, error = %e, "dequeue failed");
                break;
            }
        }
    }

    queue.deregister_querier_connection(&querier_id).await;
    served
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.queue_config();
    info!(
        max_tenant_queue_size = config.max_tenant_queue_size,
        dimensions_enabled = config.additional_queue_dimensions_enabled,
        forget_delay_us = config.querier_forget_delay_us,
        reserved_capacity = config.target_reserved_capacity,
        tenants = args.tenants,
        queriers = args.queriers,
        workers_per_querier = args.workers_per_querier,
        "Starting Helix scheduler"
    );

    let queue: RequestQueue<Query> = RequestQueue::new(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (forget_shutdown_tx, forget_shutdown_rx) = mpsc::channel(1);

    let forget = tokio::spawn(forget_task(
        queue.clone(),
        Duration::from_millis(FORGET_CHECK_INTERVAL_MS),
        forget_shutdown_rx,
    ));

    let mut workers = Vec::new();
    for querier in 0..args.queriers {
        let querier_id = QuerierId::new(format!("querier-{querier}"));
        for _ in 0..args.workers_per_querier {
            workers.push(tokio::spawn(serve(
                queue.clone(),
                querier_id.clone(),
                Duration::from_millis(args.query_duration_ms),
                shutdown_rx.clone(),
            )));
        }
    }

    let mut producers = Vec::new();
    for tenant in 0..args.tenants {
        producers.push(tokio::spawn(produce(
            queue.clone(),
            format!("tenant-{tenant}"),
            args.max_queriers_per_tenant,
            Duration::from_millis(args.request_interval_ms),
            args.seed.wrapping_add(tenant as u64),
            shutdown_rx.clone(),
        )));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_secs)).await;
    info!("Run complete, shutting down");

    // Producers stop first; queriers announce shutdown so waiting workers exit promptly.
    shutdown_tx.send(true)?;
    let mut accepted = 0;
    let mut rejected = 0;
    for producer in producers {
        let (tenant_accepted, tenant_rejected) = producer.await?;
        accepted += tenant_accepted;
        rejected += tenant_rejected;
    }
    for querier in 0..args.queriers {
        queue
            .notify_querier_shutdown(&QuerierId::new(format!("querier-{querier}")))
            .await;
    }
    let mut served = 0;
    for worker in workers {
        served += worker.await?;
    }

    forget_shutdown_tx.send(()).await?;
    forget.await?;

    let stats = queue.stats().await;
    info!(
        accepted,
        rejected,
        served,
        still_queued = stats.queued_requests,
        tenants = stats.tenants,
        total_enqueued = stats.total_enqueued,
        total_dequeued = stats.total_dequeued,
        total_rejected = stats.total_rejected,
        "Helix scheduler stopped"
    );

    Ok(())
}
