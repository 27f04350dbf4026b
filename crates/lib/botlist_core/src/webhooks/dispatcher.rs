//! Outbound webhook delivery.
//!
//! Each webhook id gets its own FIFO queue drained by a single worker task,
//! so at most one attempt per endpoint is in flight and events arrive in the
//! order they were enqueued. A semaphore caps outbound requests across all
//! workers. Workers retire after `queue_idle` without traffic.
//!
//! Every attempt (and every event skipped without an attempt) is appended to
//! the delivery log together with any change to the webhook's `broken` flag.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use reqwest::dns::Resolve;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::Event;
use super::signing;
use super::target::{self, GuardedResolver, SystemResolver, TargetError};
use crate::config::DispatcherConfig;
use crate::models::{BrokenTransition, DeliveryAttempt, DeliveryError, Webhook};
use crate::store::{StoreError, WebhookStore};
use crate::uuid::uuidv7;

/// Final-attempt statuses that quarantine an endpoint.
pub const PERMANENT_STATUSES: [u16; 5] = [400, 401, 403, 404, 410];

/// Dispatcher errors. Delivery failures are not errors; they are logged.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub status_code: Option<u16>,
    pub latency_ms: i64,
    pub error: Option<DeliveryError>,
    pub detail: Option<String>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(error: DeliveryError, detail: impl Into<String>) -> Self {
        Self {
            status_code: None,
            latency_ms: 0,
            error: Some(error),
            detail: Some(detail.into()),
        }
    }
}

struct Job {
    event: Arc<Event>,
    body: Arc<[u8]>,
}

struct Inner {
    client: reqwest::Client,
    store: Arc<dyn WebhookStore>,
    config: DispatcherConfig,
    queues: DashMap<Uuid, mpsc::UnboundedSender<Job>>,
    permits: Semaphore,
    tracker: TaskTracker,
    /// Stop accepting events and stop retrying.
    shutdown: CancellationToken,
    /// Cancel attempts still running after the grace period.
    abort: CancellationToken,
}

/// Cloneable handle to the delivery workers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn WebhookStore>, config: DispatcherConfig) -> Result<Self, DispatchError> {
        Self::with_resolver(store, config, Arc::new(SystemResolver))
    }

    /// Like [`Dispatcher::new`], resolving webhook hosts through `resolver`.
    /// Addresses it returns are still screened before connecting.
    pub fn with_resolver(
        store: Arc<dyn WebhookStore>,
        config: DispatcherConfig,
        resolver: Arc<dyn Resolve>,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .dns_resolver(GuardedResolver::new(resolver, config.allow_private_targets))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                store,
                permits: Semaphore::new(config.max_in_flight.max(1)),
                config,
                queues: DashMap::new(),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                abort: CancellationToken::new(),
            }),
        })
    }

    /// Queue `event` for every webhook registered on its target. Returns the
    /// number of webhooks it was queued for.
    pub async fn enqueue(&self, event: Event) -> Result<usize, DispatchError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }
        let hooks = self.inner.store.list(&event.target).await?;
        if hooks.is_empty() {
            return Ok(0);
        }

        let body: Arc<[u8]> = event.canonical_body()?.into();
        let event = Arc::new(event);
        for hook in &hooks {
            self.inner.push(
                hook.id,
                Job {
                    event: Arc::clone(&event),
                    body: Arc::clone(&body),
                },
            );
        }
        debug!(event_id = %event.event_id, target = %event.target, webhooks = hooks.len(), "Event queued");
        Ok(hooks.len())
    }

    /// One attempt against an unsaved webhook, bypassing queues and the
    /// delivery log. Used by the test endpoint.
    pub async fn send_once(&self, webhook: &Webhook, event: &Event) -> Result<AttemptOutcome, DispatchError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }
        let body = event.canonical_body()?;
        Ok(self.inner.attempt(webhook, &body).await)
    }

    /// Number of webhooks with a live worker.
    pub fn active_queues(&self) -> usize {
        self.inner.queues.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting events and wait for workers. Attempts still running
    /// after `grace` are cancelled and logged as `aborted`.
    pub async fn shutdown(&self, grace: Duration) {
        let inner = &self.inner;
        info!(queues = inner.queues.len(), "Dispatcher shutting down");
        inner.shutdown.cancel();
        inner.tracker.close();

        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
            warn!(grace_ms = grace.as_millis() as u64, "Grace period elapsed, aborting in-flight deliveries");
            inner.abort.cancel();
            inner.tracker.wait().await;
        }
        info!("Dispatcher stopped");
    }
}

impl Inner {
    fn push(self: &Arc<Self>, webhook_id: Uuid, job: Job) {
        match self.queues.entry(webhook_id) {
            Entry::Occupied(mut slot) => {
                // A worker that died without retiring leaves a closed sender.
                if let Err(mpsc::error::SendError(job)) = slot.get().send(job) {
                    slot.insert(self.spawn_worker(webhook_id, job));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.spawn_worker(webhook_id, job));
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, webhook_id: Uuid, first: Job) -> mpsc::UnboundedSender<Job> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tracker
            .spawn(Arc::clone(self).run_queue(webhook_id, first, rx));
        tx
    }

    async fn run_queue(
        self: Arc<Self>,
        webhook_id: Uuid,
        first: Job,
        mut rx: mpsc::UnboundedReceiver<Job>,
    ) {
        self.deliver(webhook_id, first).await;
        loop {
            tokio::select! {
                biased;
                Some(job) = rx.recv() => self.deliver(webhook_id, job).await,
                _ = self.shutdown.cancelled() => {
                    if self.retire(webhook_id, &rx) {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.queue_idle) => {
                    if self.retire(webhook_id, &rx) {
                        debug!(%webhook_id, "Idle webhook queue retired");
                        break;
                    }
                }
            }
        }
    }

    /// Drop the queue from the map if nothing is waiting in it. Senders only
    /// push under the map's entry lock, so an empty queue stays empty.
    fn retire(&self, webhook_id: Uuid, rx: &mpsc::UnboundedReceiver<Job>) -> bool {
        self.queues
            .remove_if(&webhook_id, |_, _| rx.is_empty())
            .is_some()
    }

    async fn deliver(&self, webhook_id: Uuid, job: Job) {
        if self.shutdown.is_cancelled() {
            let outcome = AttemptOutcome::failed(DeliveryError::Aborted, "dispatcher shutting down");
            self.record(webhook_id, &job, 0, &outcome, BrokenTransition::Unchanged)
                .await;
            return;
        }

        // Re-read so edits, quarantines and deletes made while queued apply.
        let webhook = match self.store.get_by_id(webhook_id).await {
            Ok(Some(w)) => w,
            Ok(None) => {
                let outcome = AttemptOutcome::failed(DeliveryError::Aborted, "webhook removed while queued");
                self.record(webhook_id, &job, 0, &outcome, BrokenTransition::Unchanged)
                    .await;
                return;
            }
            Err(e) => {
                error!(%webhook_id, event_id = %job.event.event_id, "Failed to load webhook: {e}");
                let outcome = AttemptOutcome::failed(DeliveryError::Aborted, format!("failed to load webhook: {e}"));
                self.record(webhook_id, &job, 0, &outcome, BrokenTransition::Unchanged)
                    .await;
                return;
            }
        };

        if webhook.broken {
            let outcome = AttemptOutcome::failed(DeliveryError::SkippedBroken, "webhook is broken");
            self.record(webhook_id, &job, 0, &outcome, BrokenTransition::Unchanged)
                .await;
            return;
        }
        if !webhook.accepts(&job.event.event_type) {
            let outcome = AttemptOutcome::failed(
                DeliveryError::NotWhitelisted,
                format!("{} not in event whitelist", job.event.event_type),
            );
            self.record(webhook_id, &job, 0, &outcome, BrokenTransition::Unchanged)
                .await;
            return;
        }

        self.attempt_all(&webhook, &job).await;
    }

    async fn attempt_all(&self, webhook: &Webhook, job: &Job) {
        let deadline = Instant::now() + self.config.delivery_budget;
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let number = attempt as i32;
            let outcome = tokio::select! {
                outcome = self.attempt(webhook, &job.body) => outcome,
                _ = self.abort.cancelled() => {
                    AttemptOutcome::failed(DeliveryError::Aborted, "shutdown grace period elapsed")
                }
            };

            if outcome.error == Some(DeliveryError::Aborted) {
                self.record(webhook.id, job, number, &outcome, BrokenTransition::Unchanged)
                    .await;
                return;
            }
            if outcome.is_success() {
                self.record(webhook.id, job, number, &outcome, BrokenTransition::Clear)
                    .await;
                debug!(webhook_id = %webhook.id, event_id = %job.event.event_id, attempt, "Delivered");
                return;
            }

            let delay = backoff(&self.config, attempt);
            let last = attempt == max_attempts
                || outcome.error == Some(DeliveryError::Blocked)
                || Instant::now() + delay >= deadline;
            let quarantine = last
                && outcome
                    .status_code
                    .is_some_and(|s| PERMANENT_STATUSES.contains(&s));
            let transition = if quarantine {
                BrokenTransition::MarkBroken
            } else {
                BrokenTransition::Unchanged
            };
            self.record(webhook.id, job, number, &outcome, transition)
                .await;

            if last {
                if quarantine {
                    warn!(
                        webhook_id = %webhook.id,
                        status = outcome.status_code,
                        "Webhook marked broken after permanent failure"
                    );
                } else {
                    warn!(
                        webhook_id = %webhook.id,
                        event_id = %job.event.event_id,
                        attempt,
                        error = outcome.error.map(|e| e.as_str()),
                        "Delivery failed"
                    );
                }
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    let outcome = AttemptOutcome::failed(DeliveryError::Aborted, "dispatcher shutting down");
                    self.record(webhook.id, job, number + 1, &outcome, BrokenTransition::Unchanged)
                        .await;
                    return;
                }
            }
        }
    }

    /// One request, holding a global in-flight permit.
    async fn attempt(&self, webhook: &Webhook, body: &[u8]) -> AttemptOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return AttemptOutcome::failed(DeliveryError::Aborted, "dispatcher closed");
        };
        let started = Instant::now();
        let mut outcome = self.send(webhook, body).await;
        outcome.latency_ms = started.elapsed().as_millis() as i64;
        outcome
    }

    async fn send(&self, webhook: &Webhook, body: &[u8]) -> AttemptOutcome {
        let timeout = self.config.attempt_timeout;
        if let Err(e) = target::check(&webhook.url, self.config.allow_private_targets) {
            return AttemptOutcome::failed(DeliveryError::Blocked, e.to_string());
        }

        let mut request = self
            .client
            .post(&webhook.url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        for (name, value) in signing::headers(
            &webhook.secret,
            webhook.simple_auth,
            body,
            Utc::now().timestamp(),
        ) {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    AttemptOutcome {
                        status_code: Some(status.as_u16()),
                        latency_ms: 0,
                        error: None,
                        detail: None,
                    }
                } else {
                    AttemptOutcome {
                        status_code: Some(status.as_u16()),
                        latency_ms: 0,
                        error: Some(DeliveryError::HttpStatus),
                        detail: Some(format!("HTTP {status}")),
                    }
                }
            }
            Err(e) => AttemptOutcome::failed(classify(&e), e.to_string()),
        }
    }

    async fn record(
        &self,
        webhook_id: Uuid,
        job: &Job,
        attempt: i32,
        outcome: &AttemptOutcome,
        transition: BrokenTransition,
    ) {
        let row = DeliveryAttempt {
            id: uuidv7(),
            webhook_id,
            event_id: job.event.event_id,
            event_type: job.event.event_type.clone(),
            target: job.event.target.clone(),
            attempt,
            status_code: outcome.status_code.map(i32::from),
            latency_ms: outcome.latency_ms,
            error: outcome.error,
            detail: outcome.detail.clone(),
            at: Utc::now(),
        };
        if let Err(e) = self.store.record_attempt(&row, transition).await {
            error!(%webhook_id, event_id = %row.event_id, attempt, "Failed to record delivery attempt: {e}");
        }
    }
}

/// Full-jitter exponential backoff: uniform in `[0, min(cap, base * 2^(n-1))]`.
fn backoff(config: &DispatcherConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_base
        .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
    let ceiling = u64::try_from(exp.min(config.backoff_cap).as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::rng().random_range(0..=ceiling))
}

/// Map a transport failure onto a delivery error category.
fn classify(err: &reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        return DeliveryError::Timeout;
    }
    let mut chain = String::new();
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        match e.downcast_ref::<TargetError>() {
            Some(TargetError::Dns(_)) => return DeliveryError::Dns,
            Some(_) => return DeliveryError::Blocked,
            None => {}
        }
        chain.push_str(&e.to_string().to_lowercase());
        chain.push(' ');
        source = e.source();
    }
    if ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|k| chain.contains(k))
    {
        DeliveryError::Tls
    } else if ["dns", "resolve", "lookup"].iter().any(|k| chain.contains(k)) {
        DeliveryError::Dns
    } else {
        DeliveryError::Network
    }
}
