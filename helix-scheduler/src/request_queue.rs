//! Shared, async request queue.
//!
//! Wraps a [`QueueBroker`] in a single async mutex, so every enqueue, dequeue
//! and querier lifecycle event is serialized through one lock and the shared
//! tenant rotation stays consistent across concurrent queriers.
//!
//! Dequeue long-polls: a querier worker with nothing to do waits on a
//! [`Notify`] until a request arrives, the querier population changes, or its
//! timeout expires. The number of waiting workers feeds the broker's
//! query-component utilization check.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use helix_core::QuerierId;
use helix_queue::{BrokerStats, DequeuedRequest, QueueBroker, QueueConfig, QueueResult, TenantRequest};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

struct Inner<R> {
    broker: Mutex<QueueBroker<R>>,
    /// Wakes long-polling workers after enqueues and lifecycle changes.
    notify: Notify,
    /// Querier workers currently blocked in `dequeue`.
    waiting_workers: AtomicUsize,
    /// Time base for the broker's microsecond clock.
    start: Instant,
}

/// Cloneable handle to a shared request queue.
pub struct RequestQueue<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for RequestQueue<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Counts a worker as waiting for as long as it is alive.
struct WaitingGuard<'a> {
    waiting_workers: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn new(waiting_workers: &'a AtomicUsize) -> Self {
        waiting_workers.fetch_add(1, Ordering::SeqCst);
        Self { waiting_workers }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.waiting_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<R> RequestQueue<R> {
    /// Creates a queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let broker = QueueBroker::new(config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                broker: Mutex::new(broker),
                notify: Notify::new(),
                waiting_workers: AtomicUsize::new(0),
                start: Instant::now(),
            }),
        })
    }

    /// Microseconds since the queue was created.
    #[must_use]
    pub fn now_us(&self) -> u64 {
        u64::try_from(self.inner.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Returns the number of workers currently waiting for a request.
    #[must_use]
    pub fn waiting_workers(&self) -> usize {
        self.inner.waiting_workers.load(Ordering::SeqCst)
    }

    /// Enqueues a new request for a tenant.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::TooManyRequests` if the tenant's backlog is full,
    /// or an error if the request is invalid.
    pub async fn enqueue(&self, request: TenantRequest<R>, max_queriers: usize) -> QueueResult<()> {
        self.inner
            .broker
            .lock()
            .await
            .enqueue_back(request, max_queriers)?;
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Restores a request whose dispatch failed at the head of its queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid.
    pub async fn enqueue_front(
        &self,
        request: TenantRequest<R>,
        max_queriers: usize,
    ) -> QueueResult<()> {
        self.inner
            .broker
            .lock()
            .await
            .enqueue_front(request, max_queriers)?;
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Takes the next request for a querier without waiting.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::QuerierShuttingDown` if the querier is not active.
    pub async fn try_dequeue(&self, querier_id: &QuerierId) -> QueueResult<Option<DequeuedRequest<R>>> {
        let mut broker = self.inner.broker.lock().await;
        let waiting_workers = self.waiting_workers();

        let dequeued = broker.dequeue_for_querier(querier_id, waiting_workers)?;
        if let Some(dequeued) = &dequeued {
            broker.mark_request_sent(dequeued.request.component_name());
        }
        Ok(dequeued)
    }

    /// Waits up to `timeout` for a request the querier may serve.
    ///
    /// Returns `Ok(None)` when the timeout expires first.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::QuerierShuttingDown` if the querier is, or becomes,
    /// inactive while waiting.
    pub async fn dequeue(
        &self,
        querier_id: &QuerierId,
        timeout: Duration,
    ) -> QueueResult<Option<DequeuedRequest<R>>> {
        let deadline = Instant::now() + timeout;
        let _waiting = WaitingGuard::new(&self.inner.waiting_workers);

        loop {
            // Register interest before checking, so a concurrent enqueue is not missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(dequeued) = self.try_dequeue(querier_id).await? {
                return Ok(Some(dequeued));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                debug!(querier = %querier_id, "dequeue timed out");
                return Ok(None);
            }
        }
    }

    /// Records a worker connection from a querier. Returns true if tenants were resharded.
    ///
    /// # Errors
    ///
    /// Returns an error if the querier ID is invalid or the querier limit is reached.
    pub async fn register_querier_connection(&self, querier_id: &QuerierId) -> QueueResult<bool> {
        let resharded = self
            .inner
            .broker
            .lock()
            .await
            .add_querier_connection(querier_id)?;
        if resharded {
            self.inner.notify.notify_waiters();
        }
        Ok(resharded)
    }

    /// Records a closed worker connection. Returns true if tenants were resharded.
    pub async fn deregister_querier_connection(&self, querier_id: &QuerierId) -> bool {
        let now_us = self.now_us();
        let resharded = self
            .inner
            .broker
            .lock()
            .await
            .remove_querier_connection(querier_id, now_us);
        if resharded {
            self.inner.notify.notify_waiters();
        }
        resharded
    }

    /// Handles a querier's shutdown notice. Returns true if tenants were resharded.
    ///
    /// Workers of that querier blocked in `dequeue` are woken and fail.
    pub async fn notify_querier_shutdown(&self, querier_id: &QuerierId) -> bool {
        let resharded = self
            .inner
            .broker
            .lock()
            .await
            .notify_querier_shutdown(querier_id);
        self.inner.notify.notify_waiters();
        resharded
    }

    /// Purges queriers past their forget delay. Returns true if tenants were resharded.
    pub async fn forget_disconnected_queriers(&self) -> bool {
        let now_us = self.now_us();
        let resharded = self
            .inner
            .broker
            .lock()
            .await
            .forget_disconnected_queriers(now_us);
        if resharded {
            self.inner.notify.notify_waiters();
        }
        resharded
    }

    /// Records that a querier finished a request for the named query component.
    pub async fn complete_request(&self, component_name: &str) {
        self.inner
            .broker
            .lock()
            .await
            .mark_request_completed(component_name);
    }

    /// Returns the number of queued requests.
    pub async fn len(&self) -> usize {
        self.inner.broker.lock().await.len()
    }

    /// Returns true if no requests are queued.
    pub async fn is_empty(&self) -> bool {
        self.inner.broker.lock().await.is_empty()
    }

    /// Returns broker statistics.
    pub async fn stats(&self) -> BrokerStats {
        self.inner.broker.lock().await.stats()
    }
}
