//! Event fan-out from benchmark producers to live viewers
//!
//! Producers call [`EventBroadcaster::publish`], which only ever does a
//! non-blocking enqueue onto a bounded ingest queue. A single distribution
//! task drains that queue in order, records each event in the per-kind seed
//! buffer and offers it to every subscriber's bounded outbound queue. A full
//! outbound queue drops the event for that subscriber only.
//!
//! ```text
//! publish() ──▶ ingest queue ──▶ distribution task ──┬──▶ subscriber queue ──▶ viewer
//!                                        │           ├──▶ subscriber queue ──▶ viewer
//!                                        ▼           └──▶ ...
//!                                   seed buffer
//! ```

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::StreamingConfig;
use crate::dashboard::types::{Event, EventKind};

/// Broadcaster sizing and overflow policy
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub event_queue_capacity: usize,
    pub subscriber_queue_capacity: usize,
    pub publish_timeout: Duration,
    pub seed_events_per_kind: usize,
    pub max_consecutive_drops: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for BroadcastConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            event_queue_capacity: config.event_queue_capacity.max(1),
            subscriber_queue_capacity: config.subscriber_queue_capacity.max(1),
            publish_timeout: config.publish_timeout(),
            seed_events_per_kind: config.seed_events_per_kind,
            max_consecutive_drops: config.max_consecutive_drops,
        }
    }
}

/// What happened to a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Accepted onto the ingest queue
    Queued,
    /// Ingest queue full; the event was discarded
    Dropped,
    /// Broadcaster already stopped
    Closed,
}

/// Counters describing broadcaster health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcasterStats {
    /// Events accepted by `publish`
    pub published: u64,
    /// Events processed by the distribution task
    pub distributed: u64,
    /// Per-subscriber deliveries skipped because the outbound queue was full
    pub dropped: u64,
    /// Events refused at ingest because the queue was full
    pub rejected: u64,
    /// Currently registered subscribers
    pub subscribers: usize,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    distributed: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

struct SubscriberSlot {
    tx: mpsc::Sender<Arc<Event>>,
    consecutive_drops: usize,
}

/// Recent events retained per kind so new viewers start with context
struct SeedBuffer {
    events: HashMap<EventKind, VecDeque<(u64, Arc<Event>)>>,
    per_kind_limit: usize,
    next_seq: u64,
}

impl SeedBuffer {
    fn new(per_kind_limit: usize) -> Self {
        Self {
            events: HashMap::new(),
            per_kind_limit,
            next_seq: 0,
        }
    }

    fn limit_for(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Status | EventKind::Metrics | EventKind::Progress => 1,
            EventKind::Histogram | EventKind::Scatter | EventKind::Log => self.per_kind_limit,
            EventKind::Heartbeat => 0,
        }
    }

    fn record(&mut self, event: &Arc<Event>) {
        let limit = self.limit_for(event.kind);
        if limit == 0 {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;

        let retained = self.events.entry(event.kind).or_default();
        while retained.len() >= limit {
            retained.pop_front();
        }
        retained.push_back((seq, Arc::clone(event)));
    }

    /// Retained events across all kinds in original publish order
    fn snapshot(&self) -> Vec<Arc<Event>> {
        let mut all: Vec<&(u64, Arc<Event>)> = self.events.values().flatten().collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, event)| Arc::clone(event)).collect()
    }

    fn latest(&self, kind: EventKind) -> Option<Arc<Event>> {
        self.events
            .get(&kind)
            .and_then(|retained| retained.back())
            .map(|(_, event)| Arc::clone(event))
    }
}

struct Shared {
    subscribers: HashMap<Uuid, SubscriberSlot>,
    seed: SeedBuffer,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Aggregation core of the telemetry pipeline.
///
/// Construct once per benchmark run, share behind an `Arc`, call
/// [`start`](Self::start) inside a tokio runtime and [`stop`](Self::stop) at the end.
pub struct EventBroadcaster {
    config: BroadcastConfig,
    ingest_tx: mpsc::Sender<Event>,
    ingest_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    shared: Arc<Mutex<Shared>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventBroadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        let (ingest_tx, ingest_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let shared = Shared {
            subscribers: HashMap::new(),
            seed: SeedBuffer::new(config.seed_events_per_kind),
        };

        Self {
            config,
            ingest_tx,
            ingest_rx: Mutex::new(Some(ingest_rx)),
            shared: Arc::new(Mutex::new(shared)),
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawn the distribution task. Returns false if it was already started or
    /// the broadcaster has been stopped.
    pub fn start(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(rx) = self
            .ingest_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };

        let handle = tokio::spawn(distribute(
            rx,
            Arc::clone(&self.shared),
            Arc::clone(&self.counters),
            self.config.max_consecutive_drops,
            self.cancel.clone(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::debug!(
            event_queue_capacity = self.config.event_queue_capacity,
            subscriber_queue_capacity = self.config.subscriber_queue_capacity,
            "Event distribution started"
        );
        true
    }

    /// Enqueue an event without ever waiting. Never fails the caller.
    pub fn publish(&self, event: Event) -> PublishOutcome {
        if self.cancel.is_cancelled() {
            return PublishOutcome::Closed;
        }
        match self.ingest_tx.try_send(event) {
            Ok(()) => self.accepted(),
            Err(TrySendError::Full(event)) => self.rejected(event.kind),
            Err(TrySendError::Closed(_)) => PublishOutcome::Closed,
        }
    }

    /// Enqueue an event, waiting at most the configured publish timeout for
    /// queue space before dropping it.
    pub async fn publish_timeout(&self, event: Event) -> PublishOutcome {
        if self.cancel.is_cancelled() {
            return PublishOutcome::Closed;
        }
        match self
            .ingest_tx
            .send_timeout(event, self.config.publish_timeout)
            .await
        {
            Ok(()) => self.accepted(),
            Err(SendTimeoutError::Timeout(event)) => self.rejected(event.kind),
            Err(SendTimeoutError::Closed(_)) => PublishOutcome::Closed,
        }
    }

    fn accepted(&self) -> PublishOutcome {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(crate::metrics::EVENTS_PUBLISHED).increment(1);
        PublishOutcome::Queued
    }

    fn rejected(&self, kind: EventKind) -> PublishOutcome {
        let rejected = self.counters.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!(crate::metrics::EVENTS_DROPPED, "reason" => "queue_full").increment(1);
        tracing::debug!(%kind, rejected, "Event queue full, dropping event");
        PublishOutcome::Dropped
    }

    /// Register a new subscriber.
    ///
    /// The handle first yields the current seed buffer, then live events in
    /// publish order. Both are captured under one lock so nothing is missed
    /// or duplicated between them.
    pub fn subscribe(&self) -> SubscriptionHandle {
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity);
        let id = Uuid::new_v4();

        let mut shared = lock(&self.shared);
        let seed = shared.seed.snapshot();
        if !self.cancel.is_cancelled() {
            shared.subscribers.insert(
                id,
                SubscriberSlot {
                    tx,
                    consecutive_drops: 0,
                },
            );
        }
        let count = shared.subscribers.len();
        drop(shared);

        metrics::gauge!(crate::metrics::SUBSCRIBERS).set(count as f64);
        tracing::debug!(subscriber_id = %id, subscribers = count, seeded = seed.len(), "Subscriber registered");

        SubscriptionHandle {
            id,
            seed: seed.into(),
            rx,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Remove a subscriber. Idempotent; returns whether it was still registered.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        remove_subscriber(&self.shared, handle.id)
    }

    /// Most recent retained event of a kind
    pub fn latest(&self, kind: EventKind) -> Option<Arc<Event>> {
        lock(&self.shared).seed.latest(kind)
    }

    /// Seed buffer contents in publish order
    pub fn recent_events(&self) -> Vec<Arc<Event>> {
        lock(&self.shared).seed.snapshot()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared).subscribers.len()
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            published: self.counters.published.load(Ordering::Relaxed),
            distributed: self.counters.distributed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop distribution and release every subscriber.
    ///
    /// Undelivered events are discarded. Safe to call repeatedly, before
    /// `start`, or with no subscribers.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Event distribution task ended abnormally");
            }
        }
        self.ingest_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let released = {
            let mut shared = lock(&self.shared);
            let released = shared.subscribers.len();
            shared.subscribers.clear();
            released
        };
        metrics::gauge!(crate::metrics::SUBSCRIBERS).set(0.0);
        if released > 0 {
            tracing::info!(subscribers = released, "Released subscribers on shutdown");
        }
    }
}

fn remove_subscriber(shared: &Mutex<Shared>, id: Uuid) -> bool {
    let mut shared = lock(shared);
    let removed = shared.subscribers.remove(&id).is_some();
    let count = shared.subscribers.len();
    drop(shared);

    if removed {
        metrics::gauge!(crate::metrics::SUBSCRIBERS).set(count as f64);
        tracing::debug!(subscriber_id = %id, subscribers = count, "Subscriber removed");
    }
    removed
}

async fn distribute(
    mut rx: mpsc::Receiver<Event>,
    shared: Arc<Mutex<Shared>>,
    counters: Arc<Counters>,
    max_consecutive_drops: usize,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => fan_out(&shared, &counters, max_consecutive_drops, Arc::new(event)),
                None => break,
            },
        }
    }
    tracing::debug!("Event distribution stopped");
}

fn fan_out(
    shared: &Mutex<Shared>,
    counters: &Counters,
    max_consecutive_drops: usize,
    event: Arc<Event>,
) {
    let mut shared = lock(shared);
    shared.seed.record(&event);

    let mut evicted = Vec::new();
    for (id, slot) in shared.subscribers.iter_mut() {
        match slot.tx.try_send(Arc::clone(&event)) {
            Ok(()) => slot.consecutive_drops = 0,
            Err(TrySendError::Full(_)) => {
                slot.consecutive_drops += 1;
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(crate::metrics::EVENTS_DROPPED, "reason" => "subscriber_overflow")
                    .increment(1);

                if slot.consecutive_drops == 1 {
                    tracing::warn!(
                        subscriber_id = %id,
                        kind = %event.kind,
                        "Subscriber queue full, dropping events for slow viewer"
                    );
                }
                if max_consecutive_drops > 0 && slot.consecutive_drops >= max_consecutive_drops {
                    tracing::warn!(
                        subscriber_id = %id,
                        consecutive_drops = slot.consecutive_drops,
                        "Disconnecting viewer that stopped draining its queue"
                    );
                    evicted.push(*id);
                }
            }
            Err(TrySendError::Closed(_)) => evicted.push(*id),
        }
    }

    for id in &evicted {
        shared.subscribers.remove(id);
    }
    let count = shared.subscribers.len();
    drop(shared);

    counters.distributed.fetch_add(1, Ordering::Relaxed);
    if !evicted.is_empty() {
        metrics::gauge!(crate::metrics::SUBSCRIBERS).set(count as f64);
    }
}

/// A registered viewer's view of the event stream.
///
/// Dropping the handle unsubscribes it.
pub struct SubscriptionHandle {
    id: Uuid,
    seed: VecDeque<Arc<Event>>,
    rx: mpsc::Receiver<Arc<Event>>,
    shared: Weak<Mutex<Shared>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of seeded events not yet yielded
    pub fn pending_seed(&self) -> usize {
        self.seed.len()
    }

    /// Take the remaining seeded events at once
    pub fn take_seed(&mut self) -> Vec<Arc<Event>> {
        self.seed.drain(..).collect()
    }

    /// Next event for this subscriber: seeded events first, then live ones.
    ///
    /// Returns None once the subscriber has been removed or the broadcaster stopped
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        if let Some(event) = self.seed.pop_front() {
            return Some(event);
        }
        self.rx.recv().await
    }

    /// Non-waiting variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        if let Some(event) = self.seed.pop_front() {
            return Some(event);
        }
        self.rx.try_recv().ok()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            remove_subscriber(&shared, self.id);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("pending_seed", &self.seed.len())
            .finish()
    }
}
