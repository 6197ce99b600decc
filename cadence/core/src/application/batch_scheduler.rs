// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch Scheduler
//!
//! Groups judgment requests into batches and runs them against a
//! [`JudgeInvoker`] with a bounded number of batches in flight.
//!
//! ## Modes
//!
//! | Mode | Batch size | `depends_on` |
//! |------|------------|--------------|
//! | `General` | `max_batch_size` | ignored |
//! | `LatencyAware` | grows by one under target latency, halves over it | ignored |
//! | `Temporal` | `max_batch_size` | request waits until its dependency's batch finishes |
//!
//! ## Dispatch Loop
//!
//! ```text
//! loop:
//!     acquire concurrency permit          (suspends while max_concurrency batches run)
//!     wait for a batch:
//!         queue_timeout elapsed           -> fail the queued request with BatchTimeout
//!         ready >= batch size             -> dispatch highest priority ready requests
//!         oldest ready + max_wait elapsed -> dispatch whatever is ready
//!     spawn batch with the permit         (permit released when the batch ends)
//! ```
//!
//! Requests inside a batch run concurrently and each result is delivered
//! through its own [`JudgmentHandle`] as soon as it completes. A failing
//! request never affects its siblings. With `batch_deadline` set, requests
//! still running at the deadline are retried with exponential backoff up to
//! `max_batch_retries` times before `BatchTimeout` is reported.
//!
//! A request that waits in the queue longer than its `queue_timeout` (or the
//! scheduler-wide one) is removed and fails with `BatchTimeout` after zero
//! attempts. Its dependents are released as if it had finished.

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::latency::AdaptiveBatchSize;
use crate::domain::batch::{BatchId, JudgeInvoker, JudgmentRequest, JudgmentResult, RequestId};
use crate::domain::config::{SchedulerConfig, SchedulerMode};
use crate::domain::error::JudgmentError;
use crate::domain::events::SchedulerEvent;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Judgment(#[from] JudgmentError),

    #[error("Judge invocation failed: {0}")]
    Judge(String),

    #[error("Unknown dependency: request {0} was never submitted")]
    UnknownDependency(RequestId),

    #[error("Request {0} was already submitted")]
    DuplicateRequest(RequestId),

    #[error("Scheduler is shut down")]
    Shutdown,
}

type Delivery = oneshot::Sender<Result<JudgmentResult, SchedulerError>>;

/// Awaitable result of one submitted request
#[derive(Debug)]
pub struct JudgmentHandle {
    request_id: RequestId,
    receiver: oneshot::Receiver<Result<JudgmentResult, SchedulerError>>,
}

impl JudgmentHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub async fn result(self) -> Result<JudgmentResult, SchedulerError> {
        self.receiver.await.map_err(|_| SchedulerError::Shutdown)?
    }
}

struct Pending {
    request: JudgmentRequest,
    /// Dependency finished, or there is none
    dependency_done: bool,
    ready_since: Option<Instant>,
    queued_at: Instant,
    expires_at: Option<Instant>,
    delivery: Delivery,
}

/// Priority descending, then submission order
type PendingKey = (Reverse<i32>, u64);

struct QueueState {
    pending: BTreeMap<PendingKey, Pending>,
    sequence: u64,
    /// Submitted and not yet finished
    active: HashSet<RequestId>,
    completed: HashSet<RequestId>,
    completed_order: VecDeque<RequestId>,
    adaptive: AdaptiveBatchSize,
    closed: bool,
}

impl QueueState {
    fn mark_completed(&mut self, ids: &[RequestId], retention: usize) {
        for id in ids {
            self.active.remove(id);
            if self.completed.insert(*id) {
                self.completed_order.push_back(*id);
            }
        }
        // Release dependents now; the completed set below is bounded
        for entry in self.pending.values_mut() {
            if !entry.dependency_done
                && entry
                    .request
                    .depends_on
                    .is_some_and(|dependency| ids.contains(&dependency))
            {
                entry.dependency_done = true;
            }
        }
        while self.completed_order.len() > retention.max(1) {
            if let Some(evicted) = self.completed_order.pop_front() {
                self.completed.remove(&evicted);
            }
        }
    }
}

enum NextBatch {
    Dispatch(Vec<Pending>),
    Wait(Option<Instant>),
    Drained,
}

struct SchedulerInner {
    config: SchedulerConfig,
    invoker: Arc<dyn JudgeInvoker>,
    event_bus: Option<Arc<EventBus>>,
    state: Mutex<QueueState>,
    notify: Notify,
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
    cancel: CancellationToken,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to a running scheduler
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

impl BatchScheduler {
    /// Start a scheduler on the current tokio runtime
    pub fn spawn(config: SchedulerConfig, invoker: Arc<dyn JudgeInvoker>) -> Self {
        Self::start(config, invoker, None)
    }

    /// Start a scheduler that publishes batch lifecycle events
    pub fn spawn_with_events(
        config: SchedulerConfig,
        invoker: Arc<dyn JudgeInvoker>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::start(config, invoker, Some(event_bus))
    }

    fn start(
        config: SchedulerConfig,
        invoker: Arc<dyn JudgeInvoker>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        let adaptive = AdaptiveBatchSize::new(config.max_batch_size, &config.latency);

        info!(
            mode = ?config.mode,
            max_batch_size = config.max_batch_size,
            max_concurrency,
            "Starting batch scheduler"
        );

        let inner = Arc::new(SchedulerInner {
            config,
            invoker,
            event_bus,
            state: Mutex::new(QueueState {
                pending: BTreeMap::new(),
                sequence: 0,
                active: HashSet::new(),
                completed: HashSet::new(),
                completed_order: VecDeque::new(),
                adaptive,
                closed: false,
            }),
            notify: Notify::new(),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            in_flight: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            dispatch_task: Mutex::new(None),
        });

        let handle = tokio::spawn(inner.clone().run());
        *inner.dispatch_task.lock() = Some(handle);

        Self { inner }
    }

    /// Queue a request. Fails immediately for invalid requests, duplicate
    /// ids, unknown dependencies (temporal mode) and after shutdown.
    pub fn submit(&self, request: JudgmentRequest) -> Result<JudgmentHandle, SchedulerError> {
        request.validate()?;
        let request_id = request.id;
        let (delivery, receiver) = oneshot::channel();

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(SchedulerError::Shutdown);
            }
            if state.active.contains(&request_id) || state.completed.contains(&request_id) {
                return Err(SchedulerError::DuplicateRequest(request_id));
            }
            if self.inner.config.mode == SchedulerMode::Temporal {
                if let Some(dependency) = request.depends_on {
                    if !state.active.contains(&dependency) && !state.completed.contains(&dependency) {
                        return Err(SchedulerError::UnknownDependency(dependency));
                    }
                }
            }

            let dependency_done = request
                .depends_on
                .is_none_or(|dependency| state.completed.contains(&dependency));
            let queued_at = Instant::now();
            let expires_at = request
                .queue_timeout
                .or(self.inner.config.queue_timeout)
                .map(|timeout| queued_at + timeout);

            let key = (Reverse(request.priority), state.sequence);
            state.sequence += 1;
            state.active.insert(request_id);
            state.pending.insert(
                key,
                Pending {
                    request,
                    dependency_done,
                    ready_since: None,
                    queued_at,
                    expires_at,
                    delivery,
                },
            );
        }

        metrics::counter!("cadence_requests_submitted_total").increment(1);
        debug!(request_id = %request_id, "Request queued");
        self.inner.notify.notify_one();

        Ok(JudgmentHandle {
            request_id,
            receiver,
        })
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Batch size the next dispatch will use
    pub fn current_batch_size(&self) -> usize {
        self.inner.batch_size(&self.inner.state.lock())
    }

    pub fn mode(&self) -> SchedulerMode {
        self.inner.config.mode
    }

    /// Stop accepting requests, dispatch everything already queued and wait
    /// for in-flight batches to finish.
    pub async fn shutdown(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_one();
        self.join_dispatch().await;
        self.wait_idle().await;
        info!("Batch scheduler stopped");
    }

    /// Stop immediately: queued requests fail with `Shutdown`, in-flight
    /// batches run to completion.
    pub async fn shutdown_now(&self) {
        self.inner.state.lock().closed = true;
        self.inner.cancel.cancel();
        self.join_dispatch().await;

        let abandoned: Vec<Pending> = {
            let mut state = self.inner.state.lock();
            let pending = std::mem::take(&mut state.pending);
            for entry in pending.values() {
                state.active.remove(&entry.request.id);
            }
            pending.into_values().collect()
        };
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Abandoning queued requests on shutdown");
        }
        for entry in abandoned {
            let _ = entry.delivery.send(Err(SchedulerError::Shutdown));
        }

        self.wait_idle().await;
        info!("Batch scheduler stopped");
    }

    async fn join_dispatch(&self) {
        let handle = self.inner.dispatch_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Dispatch loop terminated abnormally: {}", e);
            }
        }
    }

    async fn wait_idle(&self) {
        let permits = self.inner.config.max_concurrency.max(1) as u32;
        if let Ok(all) = self.inner.permits.acquire_many(permits).await {
            drop(all);
        }
    }
}

impl SchedulerInner {
    fn batch_size(&self, state: &QueueState) -> usize {
        match self.config.mode {
            SchedulerMode::LatencyAware => state.adaptive.current(),
            SchedulerMode::General | SchedulerMode::Temporal => self.config.max_batch_size.max(1),
        }
    }

    fn publish(&self, event: SchedulerEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_scheduler_event(event);
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let Some(permit) = self.acquire_permit().await else {
                break;
            };

            let batch = tokio::select! {
                _ = self.cancel.cancelled() => break,
                batch = self.next_batch() => batch,
            };
            let Some(batch) = batch else {
                break;
            };

            let inner = self.clone();
            tokio::spawn(async move {
                inner.execute_batch(batch, permit).await;
            });
        }
        debug!("Dispatch loop exited");
    }

    /// Wait for a free concurrency slot, expiring queued requests meanwhile;
    /// `None` once cancelled
    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        loop {
            let notified = self.notify.notified();
            let next_expiry = self.expire_queued(Instant::now());
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                permit = self.permits.clone().acquire_owned() => return permit.ok(),
                _ = sleep_until_opt(next_expiry) => {}
                _ = notified => {}
            }
        }
    }

    /// Wait until a batch is due; `None` once closed and drained
    async fn next_batch(&self) -> Option<Vec<Pending>> {
        loop {
            let notified = self.notify.notified();
            let now = Instant::now();
            let next_expiry = self.expire_queued(now);
            match self.poll_batch(now) {
                NextBatch::Dispatch(batch) => return Some(batch),
                NextBatch::Drained => return None,
                NextBatch::Wait(flush_at) => {
                    let wake = match (flush_at, next_expiry) {
                        (Some(flush_at), Some(expiry)) => Some(flush_at.min(expiry)),
                        (flush_at, expiry) => flush_at.or(expiry),
                    };
                    tokio::select! {
                        _ = notified => {}
                        _ = sleep_until_opt(wake) => {}
                    }
                }
            }
        }
    }

    /// Fail queued requests whose queue timeout has elapsed and return the
    /// earliest remaining expiry
    fn expire_queued(&self, now: Instant) -> Option<Instant> {
        let (expired, next_expiry) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let due: Vec<PendingKey> = state
                .pending
                .iter()
                .filter(|(_, entry)| entry.expires_at.is_some_and(|at| at <= now))
                .map(|(key, _)| *key)
                .collect();
            let expired: Vec<Pending> = due
                .iter()
                .filter_map(|key| state.pending.remove(key))
                .collect();
            if !expired.is_empty() {
                let ids: Vec<RequestId> = expired.iter().map(|entry| entry.request.id).collect();
                state.mark_completed(&ids, self.config.dependency_retention);
            }
            let next_expiry = state.pending.values().filter_map(|entry| entry.expires_at).min();
            (expired, next_expiry)
        };

        for entry in expired {
            let request_id = entry.request.id;
            let waited_ms = now.saturating_duration_since(entry.queued_at).as_millis() as u64;
            warn!(%request_id, waited_ms, "Request expired before dispatch");
            metrics::counter!("cadence_requests_failed_total").increment(1);
            metrics::counter!("cadence_requests_expired_total").increment(1);
            self.publish(SchedulerEvent::RequestExpired {
                request_id,
                waited_ms,
            });
            let _ = entry.delivery.send(Err(SchedulerError::Judgment(
                JudgmentError::BatchTimeout {
                    request_id,
                    attempts: 0,
                },
            )));
        }

        next_expiry
    }

    fn poll_batch(&self, now: Instant) -> NextBatch {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed && state.pending.is_empty() {
            return NextBatch::Drained;
        }

        let temporal = self.config.mode == SchedulerMode::Temporal;
        let batch_size = self.batch_size(state);

        let mut ready: Vec<PendingKey> = Vec::new();
        let mut oldest: Option<Instant> = None;
        for (key, entry) in state.pending.iter_mut() {
            let is_ready = !temporal || entry.dependency_done;
            if !is_ready {
                continue;
            }
            let since = *entry.ready_since.get_or_insert(now);
            oldest = Some(oldest.map_or(since, |o: Instant| o.min(since)));
            if ready.len() < batch_size {
                ready.push(*key);
            }
        }

        let Some(oldest) = oldest else {
            return NextBatch::Wait(None);
        };
        let flush_at = oldest + self.config.max_wait;
        if ready.len() >= batch_size || now >= flush_at || state.closed {
            let batch = ready
                .iter()
                .filter_map(|key| state.pending.remove(key))
                .collect();
            NextBatch::Dispatch(batch)
        } else {
            NextBatch::Wait(Some(flush_at))
        }
    }

    async fn execute_batch(self: Arc<Self>, batch: Vec<Pending>, permit: OwnedSemaphorePermit) {
        let batch_id = BatchId::new();
        let size = batch.len();
        let request_ids: Vec<RequestId> = batch.iter().map(|p| p.request.id).collect();
        let limit = self.config.max_concurrency.max(1);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

        if in_flight > limit {
            error!(%batch_id, in_flight, limit, "Batch dispatched beyond concurrency limit");
            for entry in batch {
                let _ = entry.delivery.send(Err(SchedulerError::Judgment(
                    JudgmentError::ConcurrencyLimitExceeded { in_flight, limit },
                )));
            }
            self.finish(&request_ids, None);
            drop(permit);
            return;
        }

        metrics::counter!("cadence_batches_dispatched_total").increment(1);
        metrics::gauge!("cadence_batches_in_flight").set(in_flight as f64);
        info!(%batch_id, size, in_flight, "Dispatching batch");
        self.publish(SchedulerEvent::BatchStarted {
            batch_id,
            request_ids: request_ids.clone(),
            in_flight,
            started_at: chrono::Utc::now(),
        });

        let started = Instant::now();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut attempt: u32 = 1;
        let mut remaining = batch;

        loop {
            let deadline = self.config.batch_deadline.map(|d| Instant::now() + d);
            let mut running = FuturesUnordered::new();
            for entry in remaining.drain(..) {
                let invoker = self.invoker.clone();
                running.push(async move {
                    let outcome = match deadline {
                        Some(deadline) => {
                            tokio::time::timeout_at(deadline, invoker.invoke(&entry.request))
                                .await
                                .ok()
                        }
                        None => Some(invoker.invoke(&entry.request).await),
                    };
                    (entry, outcome)
                });
            }

            let mut timed_out = Vec::new();
            while let Some((entry, outcome)) = running.next().await {
                let Some(outcome) = outcome else {
                    timed_out.push(entry);
                    continue;
                };
                let request_id = entry.request.id;
                let delivered = match outcome {
                    Ok(outcome) => match outcome.validate() {
                        Ok(()) => {
                            succeeded += 1;
                            Ok(JudgmentResult {
                                request_id,
                                batch_id,
                                outcome,
                                requested_at: entry.request.requested_at,
                                completed_at: chrono::Utc::now(),
                                attempts: attempt,
                            })
                        }
                        Err(e) => {
                            failed += 1;
                            Err(SchedulerError::Judgment(e))
                        }
                    },
                    Err(e) => {
                        failed += 1;
                        Err(SchedulerError::Judge(e.to_string()))
                    }
                };

                match &delivered {
                    Ok(_) => self.publish(SchedulerEvent::RequestCompleted {
                        batch_id,
                        request_id,
                        completed_at: chrono::Utc::now(),
                    }),
                    Err(e) => {
                        warn!(%batch_id, %request_id, "Request failed: {}", e);
                        metrics::counter!("cadence_requests_failed_total").increment(1);
                        self.publish(SchedulerEvent::RequestFailed {
                            batch_id,
                            request_id,
                            reason: e.to_string(),
                        });
                    }
                }
                // The caller may have dropped its handle
                let _ = entry.delivery.send(delivered);
            }

            if timed_out.is_empty() {
                break;
            }

            if attempt > self.config.max_batch_retries {
                for entry in timed_out {
                    let request_id = entry.request.id;
                    failed += 1;
                    warn!(%batch_id, %request_id, attempts = attempt, "Request timed out");
                    metrics::counter!("cadence_requests_failed_total").increment(1);
                    let err = JudgmentError::BatchTimeout {
                        request_id,
                        attempts: attempt,
                    };
                    self.publish(SchedulerEvent::RequestFailed {
                        batch_id,
                        request_id,
                        reason: err.to_string(),
                    });
                    let _ = entry.delivery.send(Err(SchedulerError::Judgment(err)));
                }
                break;
            }

            let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempt - 1);
            warn!(
                %batch_id,
                attempt,
                pending = timed_out.len(),
                backoff_ms = backoff.as_millis() as u64,
                "Batch deadline expired, retrying unfinished requests"
            );
            metrics::counter!("cadence_batch_retries_total").increment(1);
            self.publish(SchedulerEvent::BatchRetried {
                batch_id,
                attempt: attempt + 1,
                pending: timed_out.len(),
                backoff_ms: backoff.as_millis() as u64,
            });
            tokio::time::sleep(backoff).await;

            attempt += 1;
            remaining = timed_out;
        }

        let latency = started.elapsed();
        metrics::histogram!("cadence_batch_latency_seconds").record(latency.as_secs_f64());
        self.finish(&request_ids, Some(latency));

        info!(
            %batch_id,
            size,
            succeeded,
            failed,
            latency_ms = latency.as_millis() as u64,
            "Batch completed"
        );
        self.publish(SchedulerEvent::BatchCompleted {
            batch_id,
            size,
            succeeded,
            failed,
            latency_ms: latency.as_millis() as u64,
            completed_at: chrono::Utc::now(),
        });

        drop(permit);
        self.notify.notify_one();
    }

    /// Release dependents, adapt the batch size and leave the in-flight set
    fn finish(&self, request_ids: &[RequestId], latency: Option<Duration>) {
        let adjustment = {
            let mut state = self.state.lock();
            state.mark_completed(request_ids, self.config.dependency_retention);
            match (self.config.mode, latency) {
                (SchedulerMode::LatencyAware, Some(latency)) => {
                    Some((state.adaptive.observe(latency), latency))
                }
                _ => None,
            }
        };

        if let Some((adjustment, latency)) = adjustment {
            if adjustment.changed() {
                debug!(
                    previous = adjustment.previous,
                    next = adjustment.next,
                    "Adjusted batch size"
                );
                self.publish(SchedulerEvent::BatchSizeAdjusted {
                    previous: adjustment.previous,
                    next: adjustment.next,
                    latency_ms: latency.as_millis() as u64,
                });
            }
        }

        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("cadence_batches_in_flight").set(remaining as f64);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::{JudgeError, JudgeOutcome};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoJudge;

    #[async_trait]
    impl JudgeInvoker for EchoJudge {
        async fn invoke(&self, request: &JudgmentRequest) -> Result<JudgeOutcome, JudgeError> {
            let score = request.payload["score"].as_f64().unwrap_or(5.0);
            Ok(JudgeOutcome::scored(score))
        }
    }

    fn scheduler(mode: SchedulerMode) -> BatchScheduler {
        BatchScheduler::spawn(
            SchedulerConfig {
                mode,
                ..Default::default()
            },
            Arc::new(EchoJudge),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_and_receive_result() {
        let scheduler = scheduler(SchedulerMode::General);
        let handle = scheduler
            .submit(JudgmentRequest::new(json!({"score": 8.0})))
            .unwrap();
        let result = handle.result().await.unwrap();
        assert_eq!(result.score(), Some(8.0));
        assert_eq!(result.attempts, 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_dependency_rejected_only_in_temporal_mode() {
        let orphan = JudgmentRequest::new(json!({})).depends_on(RequestId::new());
        let temporal = scheduler(SchedulerMode::Temporal);
        assert!(matches!(
            temporal.submit(orphan.clone()),
            Err(SchedulerError::UnknownDependency(_))
        ));

        let general = scheduler(SchedulerMode::General);
        let handle = general.submit(orphan).unwrap();
        assert!(handle.result().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_post_shutdown_submissions_fail() {
        let scheduler = scheduler(SchedulerMode::Temporal);
        let request = JudgmentRequest::new(json!({}));
        let _handle = scheduler.submit(request.clone()).unwrap();
        assert!(matches!(
            scheduler.submit(request),
            Err(SchedulerError::DuplicateRequest(_))
        ));

        scheduler.shutdown().await;
        assert!(matches!(
            scheduler.submit(JudgmentRequest::new(json!({}))),
            Err(SchedulerError::Shutdown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_judge_output_fails_request() {
        let scheduler = scheduler(SchedulerMode::General);
        let handle = scheduler
            .submit(JudgmentRequest::new(json!({"score": 42.0})))
            .unwrap();
        let err = handle.result().await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Judgment(JudgmentError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_shutdown_drains_queue() {
        let scheduler = scheduler(SchedulerMode::General);
        let handles: Vec<JudgmentHandle> = (0..3)
            .map(|_| scheduler.submit(JudgmentRequest::new(json!({}))).unwrap())
            .collect();
        scheduler.shutdown().await;
        for handle in handles {
            assert!(handle.result().await.is_ok());
        }
        assert_eq!(scheduler.pending_len(), 0);
    }
}
