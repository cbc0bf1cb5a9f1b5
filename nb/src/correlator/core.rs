//! Main Correlator task implementation

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CorrelatorConfig;
use super::handle::CorrelatorHandle;
use super::messages::{CallbackResult, CorrRequest, CorrelatorMetrics, ResolutionOutcome};
use super::supervisor;
use super::token::CorrelationToken;

/// One in-flight round trip
///
/// The oneshot sender is the single-slot result holder: sending consumes it,
/// so an entry can be written at most once.
struct PendingRequest {
    outcome_tx: oneshot::Sender<ResolutionOutcome>,
    created_at: Instant,
    deadline: Option<Instant>,
    timer: Option<AbortHandle>,
}

/// Recently closed tokens, oldest first
struct Quarantine {
    window: Duration,
    order: VecDeque<(Instant, CorrelationToken)>,
    members: HashMap<CorrelationToken, Instant>,
}

impl Quarantine {
    fn new(window: Duration) -> Self {
        Self {
            window,
            order: VecDeque::new(),
            members: HashMap::new(),
        }
    }

    fn insert(&mut self, token: CorrelationToken, now: Instant) {
        if self.window.is_zero() {
            return;
        }
        self.order.push_back((now, token));
        self.members.insert(token, now);
    }

    fn contains(&self, token: &CorrelationToken) -> bool {
        self.members.contains_key(token)
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(closed_at, token)) = self.order.front() {
            if now.duration_since(closed_at) < self.window {
                break;
            }
            self.order.pop_front();
            self.members.remove(&token);
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

/// The correlation table: token -> pending request, plus bookkeeping
///
/// Only the Correlator task touches this, so every mutation is serialized.
/// Removing an entry from `pending` is the single write of its result slot:
/// whichever request removes it first wins, every later one finds nothing.
struct CorrelationTable {
    pending: HashMap<CorrelationToken, PendingRequest>,
    quarantine: Quarantine,
    metrics: CorrelatorMetrics,
}

impl CorrelationTable {
    fn new(quarantine: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            quarantine: Quarantine::new(quarantine),
            metrics: CorrelatorMetrics::default(),
        }
    }

    /// Issue a token that is neither live nor quarantined
    fn issue_token(&self) -> CorrelationToken {
        loop {
            let token = CorrelationToken::generate();
            if !self.pending.contains_key(&token) && !self.quarantine.contains(&token) {
                return token;
            }
            warn!(%token, "Generated token collides with a live or quarantined token, regenerating");
        }
    }

    fn register(&mut self, outcome_tx: oneshot::Sender<ResolutionOutcome>, now: Instant) -> CorrelationToken {
        let token = self.issue_token();
        self.pending.insert(
            token,
            PendingRequest {
                outcome_tx,
                created_at: now,
                deadline: None,
                timer: None,
            },
        );
        self.metrics.registered += 1;
        debug!(%token, pending = self.pending.len(), "Registered pending request");
        token
    }

    fn arm(&mut self, token: CorrelationToken, timeout: Duration, now: Instant, tx: &mpsc::Sender<CorrRequest>) {
        let Some(entry) = self.pending.get_mut(&token) else {
            debug!(%token, "arm: entry already resolved, nothing to arm");
            return;
        };
        if entry.timer.is_some() {
            debug!(%token, "arm: entry already armed");
            return;
        }
        let timeout = supervisor::clamp_timeout(timeout);
        entry.deadline = Some(now + timeout);
        entry.timer = Some(supervisor::arm(token, timeout, tx.clone()));
        debug!(%token, ?timeout, "Armed deadline");
    }

    /// Apply a terminal outcome; returns whether this call won
    fn settle(&mut self, token: CorrelationToken, outcome: ResolutionOutcome, now: Instant) -> bool {
        let Some(entry) = self.pending.remove(&token) else {
            return false;
        };
        if let Some(timer) = entry.timer {
            timer.abort();
        }
        self.quarantine.insert(token, now);

        match &outcome {
            ResolutionOutcome::Delivered(_) => self.metrics.delivered += 1,
            ResolutionOutcome::TimedOut => self.metrics.timed_out += 1,
            ResolutionOutcome::TransportFailed(_) => self.metrics.transport_failed += 1,
            ResolutionOutcome::Cancelled => self.metrics.cancelled += 1,
        }

        let kind = outcome.kind();
        let elapsed_ms = now.duration_since(entry.created_at).as_millis();
        let overdue = entry.deadline.is_some_and(|deadline| now > deadline);
        if entry.outcome_tx.send(outcome).is_err() {
            debug!(%token, kind, "settle: waiter already gone");
        }
        debug!(%token, kind, elapsed_ms, overdue, pending = self.pending.len(), "Settled pending request");
        true
    }

    fn resolve(&mut self, token: CorrelationToken, result: CallbackResult, now: Instant) -> bool {
        if self.settle(token, ResolutionOutcome::Delivered(result), now) {
            return true;
        }
        if self.quarantine.contains(&token) {
            self.metrics.duplicate_callbacks += 1;
            warn!(%token, "Discarding duplicate or late callback for an already closed token");
        } else {
            self.metrics.unknown_callbacks += 1;
            warn!(%token, "Discarding callback for unknown token");
        }
        false
    }

    fn expire(&mut self, token: CorrelationToken, now: Instant) {
        if self.settle(token, ResolutionOutcome::TimedOut, now) {
            warn!(%token, "Pending request timed out");
        } else {
            debug!(%token, "expire: entry already resolved");
        }
    }

    fn cancel_all(&mut self, now: Instant) -> usize {
        let tokens: Vec<CorrelationToken> = self.pending.keys().copied().collect();
        for token in &tokens {
            self.settle(*token, ResolutionOutcome::Cancelled, now);
        }
        tokens.len()
    }

    fn snapshot(&self) -> CorrelatorMetrics {
        CorrelatorMetrics {
            pending: self.pending.len(),
            quarantined: self.quarantine.len(),
            ..self.metrics.clone()
        }
    }
}

/// The Correlator owns the correlation table and serializes every access to it
pub struct Correlator {
    config: CorrelatorConfig,
    tx: mpsc::Sender<CorrRequest>,
    rx: mpsc::Receiver<CorrRequest>,
}

impl Correlator {
    /// Create a new Correlator with the given configuration
    pub fn new(config: CorrelatorConfig) -> Self {
        debug!(?config, "Correlator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_capacity());
        Self { config, tx, rx }
    }

    /// Get a handle for registering and resolving requests
    pub fn handle(&self) -> CorrelatorHandle {
        CorrelatorHandle::new(self.tx.clone())
    }

    /// Create a Correlator, spawn its task and return a handle to it
    pub fn spawn(config: CorrelatorConfig) -> (CorrelatorHandle, JoinHandle<()>) {
        let correlator = Self::new(config);
        let handle = correlator.handle();
        let task = tokio::spawn(correlator.run());
        (handle, task)
    }

    /// Run the Correlator task
    ///
    /// This consumes the Correlator and runs until shutdown is requested.
    pub async fn run(mut self) {
        let self_tx = self.tx.clone();
        let mut table = CorrelationTable::new(self.config.quarantine());

        info!(quarantine_ms = self.config.quarantine_ms, "Correlator started");

        while let Some(req) = self.rx.recv().await {
            let now = Instant::now();
            table.quarantine.prune(now);

            match req {
                CorrRequest::Register { outcome_tx, reply_tx } => {
                    let token = table.register(outcome_tx, now);
                    if reply_tx.send(token).is_err() {
                        // Registrant vanished before learning its token
                        table.settle(token, ResolutionOutcome::Cancelled, now);
                    }
                }

                CorrRequest::Arm { token, timeout } => {
                    table.arm(token, timeout, now, &self_tx);
                }

                CorrRequest::Resolve {
                    token,
                    result,
                    reply_tx,
                } => {
                    let won = table.resolve(token, result, now);
                    let _ = reply_tx.send(won);
                }

                CorrRequest::Expire { token } => {
                    table.expire(token, now);
                }

                CorrRequest::Fail { token, reason } => {
                    if table.settle(token, ResolutionOutcome::TransportFailed(reason.clone()), now) {
                        warn!(%token, %reason, "Outbound call failed");
                    }
                }

                CorrRequest::Abandon { token } => {
                    if table.settle(token, ResolutionOutcome::Cancelled, now) {
                        debug!(%token, "Waiter abandoned pending request");
                    }
                }

                CorrRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(table.snapshot());
                }

                CorrRequest::Shutdown => {
                    let cancelled = table.cancel_all(now);
                    info!(cancelled, "Correlator shutting down");
                    break;
                }
            }
        }

        info!("Correlator stopped");
    }
}
