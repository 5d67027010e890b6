//! Background task that forgets disconnected queriers.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::request_queue::RequestQueue;

/// Interval between sweeps for queriers past their forget delay (in milliseconds).
pub const FORGET_CHECK_INTERVAL_MS: u64 = 5_000;

/// Periodically purges queriers whose forget delay elapsed, until shutdown.
pub async fn forget_task<R>(
    queue: RequestQueue<R>,
    period: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Forget task shutting down");
                break;
            }
            _ = interval.tick() => {
                if queue.forget_disconnected_queriers().await {
                    debug!("Forgot disconnected queriers, tenants resharded");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::QuerierId;
    use helix_queue::QueueConfig;

    #[tokio::test(start_paused = true)]
    async fn test_forget_task_purges_and_stops() {
        let queue: RequestQueue<u32> = RequestQueue::new(QueueConfig::for_testing()).unwrap();
        let querier = QuerierId::from("querier-1");
        queue.register_querier_connection(&querier).await.unwrap();
        queue.deregister_querier_connection(&querier).await;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(forget_task(
            queue.clone(),
            Duration::from_millis(100),
            shutdown_rx,
        ));

        // Past the one second forget delay plus one sweep.
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(queue.stats().await.queriers, 0);

        shutdown_tx.send(()).await.unwrap();
        task.await.unwrap();
    }
}
