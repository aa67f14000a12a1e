//! Polling controller for one deployment-watch session
//!
//! Drives the fetch → ingest → project → emit cycle for a single DAO.
//! At most one fetch is outstanding at a time and the next one is only
//! scheduled after the previous one has resolved.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::decode::identifiers::{
    flatten_identifiers, resolve_identifiers, FallbackIdentifiers, ResolvedIdentifiers,
};
use crate::errors::WatchError;
use crate::http::explorer::SnapshotSource;
use crate::models::deployment::{DeploymentSnapshot, DeploymentStatus};
use crate::progress::accumulator::ProgressAccumulator;
use crate::progress::projector::{project, StepDescriptor};
use crate::watch::fsm::{ControllerEvent, ControllerFsm, ControllerState, StopReason};

/// Polling controller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Poll interval while the DAO has no deployment record yet
    pub waiting_interval: Duration,

    /// Poll interval while a deployment is queued or running
    pub tracking_interval: Duration,

    /// Upper bound on a single fetch
    pub fetch_timeout: Duration,

    /// End the session after this many consecutive transport failures.
    /// `None` retries forever.
    pub max_consecutive_errors: Option<u32>,

    /// Identifiers substituted for missing required roles
    pub fallback_identifiers: FallbackIdentifiers,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            waiting_interval: Duration::from_millis(200),
            tracking_interval: Duration::from_millis(2000),
            fetch_timeout: Duration::from_secs(10),
            max_consecutive_errors: None,
            fallback_identifiers: FallbackIdentifiers::default(),
        }
    }
}

/// Routing signal for the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    /// The DAO does not exist
    NotFound,

    /// The session cannot continue
    Error(String),
}

/// Output of a watch session, in emission order
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    /// Non-terminal progress
    Progress {
        dao_id: String,
        descriptor: StepDescriptor,
    },

    /// Deployment finished
    Completed {
        dao_id: String,
        descriptor: StepDescriptor,
        identifiers: ResolvedIdentifiers,
        snapshot: DeploymentSnapshot,
    },

    /// Deployment failed
    Failed {
        dao_id: String,
        descriptor: StepDescriptor,
        snapshot: DeploymentSnapshot,
    },

    /// Terminal routing signal
    Redirect { dao_id: String, redirect: Redirect },
}

impl WatchEvent {
    pub fn dao_id(&self) -> &str {
        match self {
            WatchEvent::Progress { dao_id, .. }
            | WatchEvent::Completed { dao_id, .. }
            | WatchEvent::Failed { dao_id, .. }
            | WatchEvent::Redirect { dao_id, .. } => dao_id,
        }
    }

    /// Whether this is the last event its session emits
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchEvent::Progress { .. })
    }

    /// Descriptor carried by the event, if any
    pub fn descriptor(&self) -> Option<&StepDescriptor> {
        match self {
            WatchEvent::Progress { descriptor, .. }
            | WatchEvent::Completed { descriptor, .. }
            | WatchEvent::Failed { descriptor, .. } => Some(descriptor),
            WatchEvent::Redirect { .. } => None,
        }
    }
}

/// What the loop does after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Poll again after the delay
    Continue(Duration),

    /// The session is over
    Stop(StopReason),
}

/// Handle that stops a session from outside its task
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Watch session for one DAO. Owns its accumulator exclusively.
pub struct PollingController<S: SnapshotSource + ?Sized> {
    dao_id: String,
    source: Arc<S>,
    options: Options,
    fsm: ControllerFsm,
    accumulator: ProgressAccumulator,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    idle_interval: Duration,
    err_streak: u32,
    fetch_count: u64,
}

impl<S: SnapshotSource + ?Sized> PollingController<S> {
    /// Create a controller in idle state
    pub fn new(
        dao_id: impl Into<String>,
        source: Arc<S>,
        options: Options,
        events_tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let idle_interval = options.waiting_interval;
        Self {
            dao_id: dao_id.into(),
            source,
            options,
            fsm: ControllerFsm::new(),
            accumulator: ProgressAccumulator::new(),
            events_tx,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            idle_interval,
            err_streak: 0,
            fetch_count: 0,
        }
    }

    pub fn dao_id(&self) -> &str {
        &self.dao_id
    }

    pub fn state(&self) -> ControllerState {
        self.fsm.state()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.fsm.stop_reason()
    }

    pub fn accumulator(&self) -> &ProgressAccumulator {
        &self.accumulator
    }

    /// Number of fetches issued so far
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count
    }

    /// Handle for cancelling the session from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Begin watching and perform the first poll immediately
    pub async fn start(&mut self) -> Result<PollOutcome, WatchError> {
        self.fsm
            .process(ControllerEvent::Start)
            .map_err(WatchError::Internal)?;
        info!("Watching deployment of DAO {}", self.dao_id);
        Ok(self.poll_once().await)
    }

    /// Stop the session. No event is emitted after this returns.
    pub fn cancel(&mut self) {
        self.cancel_tx.send_replace(true);
        if self.fsm.state() == ControllerState::Stopped {
            return;
        }
        if let Err(e) = self.fsm.process(ControllerEvent::Cancel) {
            error!("DAO {}: {}", self.dao_id, e);
            return;
        }
        info!("Stopped watching DAO {} (cancelled)", self.dao_id);
    }

    fn cancel_requested(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn stopped_outcome(&self) -> PollOutcome {
        PollOutcome::Stop(self.fsm.stop_reason().unwrap_or(StopReason::Cancelled))
    }

    /// One fetch → ingest → project → emit cycle
    pub async fn poll_once(&mut self) -> PollOutcome {
        if !self.fsm.is_watching() {
            return self.stopped_outcome();
        }

        self.fetch_count += 1;
        let result = match tokio::time::timeout(
            self.options.fetch_timeout,
            self.source.fetch_snapshot(&self.dao_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WatchError::Timeout(self.options.fetch_timeout)),
        };

        // The fetch may have outlived the session
        if self.cancel_requested() {
            debug!("DAO {}: discarding fetch result after cancel", self.dao_id);
            self.cancel();
            return self.stopped_outcome();
        }

        match result {
            Ok(Some(snapshot)) => {
                self.err_streak = 0;
                self.observe(snapshot)
            }
            Ok(None) => {
                self.err_streak = 0;
                self.idle_interval = self.options.waiting_interval;
                debug!("DAO {}: waiting for deployment record", self.dao_id);
                PollOutcome::Continue(self.options.waiting_interval)
            }
            Err(e) => self.on_fetch_error(e),
        }
    }

    fn observe(&mut self, snapshot: DeploymentSnapshot) -> PollOutcome {
        self.accumulator.ingest(&snapshot);
        let descriptor = project(&snapshot, &self.accumulator);
        debug!(
            "DAO {}: {} [{}] {}",
            self.dao_id, descriptor.phase_name, descriptor.phase_index, descriptor.current_action_text
        );

        match &snapshot.status {
            DeploymentStatus::Queued { .. } | DeploymentStatus::Deploying { .. } => {
                self.idle_interval = self.options.tracking_interval;
                self.emit(WatchEvent::Progress {
                    dao_id: self.dao_id.clone(),
                    descriptor,
                });
                if !self.fsm.is_watching() {
                    return self.stopped_outcome();
                }
                PollOutcome::Continue(self.options.tracking_interval)
            }
            DeploymentStatus::Deployed { identifiers, .. } => {
                let identifiers = resolve_identifiers(
                    flatten_identifiers(identifiers),
                    &self.options.fallback_identifiers,
                );
                info!("DAO {} deployed: {:?}", self.dao_id, identifiers.identifiers);
                self.emit(WatchEvent::Completed {
                    dao_id: self.dao_id.clone(),
                    descriptor,
                    identifiers,
                    snapshot,
                });
                self.finish(StopReason::Deployed)
            }
            DeploymentStatus::Failed { error_message, .. } => {
                warn!("DAO {} deployment failed: {}", self.dao_id, error_message);
                self.emit(WatchEvent::Failed {
                    dao_id: self.dao_id.clone(),
                    descriptor,
                    snapshot,
                });
                self.finish(StopReason::Failed)
            }
        }
    }

    fn on_fetch_error(&mut self, e: WatchError) -> PollOutcome {
        if e.is_transient() {
            self.err_streak += 1;
            warn!(
                "DAO {}: fetch failed (attempt {}), retrying in {:?}: {}",
                self.dao_id, self.err_streak, self.idle_interval, e
            );
            return match self.options.max_consecutive_errors {
                Some(max) if self.err_streak >= max => {
                    self.redirect(Redirect::Error(format!(
                        "giving up after {} consecutive fetch failures: {}",
                        self.err_streak, e
                    )));
                    self.finish(StopReason::Error)
                }
                _ => PollOutcome::Continue(self.idle_interval),
            };
        }

        if e.is_not_found() {
            warn!("DAO {} not found", self.dao_id);
            self.redirect(Redirect::NotFound);
            return self.finish(StopReason::NotFound);
        }

        error!("DAO {}: unrecoverable fetch error: {}", self.dao_id, e);
        self.redirect(Redirect::Error(e.to_string()));
        self.finish(StopReason::Error)
    }

    fn redirect(&mut self, redirect: Redirect) {
        self.emit(WatchEvent::Redirect {
            dao_id: self.dao_id.clone(),
            redirect,
        });
    }

    fn emit(&mut self, event: WatchEvent) {
        if !self.fsm.is_watching() {
            return;
        }
        if self.events_tx.send(event).is_err() {
            // Nobody is listening any more; treat it like a teardown
            debug!("DAO {}: event receiver dropped", self.dao_id);
            self.cancel();
        }
    }

    fn finish(&mut self, reason: StopReason) -> PollOutcome {
        if self.fsm.is_watching() {
            if let Err(e) = self.fsm.process(ControllerEvent::Terminal(reason)) {
                error!("DAO {}: {}", self.dao_id, e);
            }
            info!("Stopped watching DAO {} ({:?})", self.dao_id, reason);
        }
        self.stopped_outcome()
    }

    /// Run the session until it stops.
    ///
    /// `sleep_fn` provides the delay between polls; the cancel handle
    /// interrupts a pending delay but never an in-flight fetch.
    pub async fn run<F, Fut>(mut self, sleep_fn: F) -> StopReason
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut cancel_rx = self.cancel_rx.clone();

        if self.cancel_requested() {
            self.cancel();
            return StopReason::Cancelled;
        }

        let mut outcome = match self.start().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("DAO {}: failed to start watch: {}", self.dao_id, e);
                return StopReason::Error;
            }
        };

        loop {
            let delay = match outcome {
                PollOutcome::Stop(reason) => return reason,
                PollOutcome::Continue(delay) => delay,
            };

            let cancelled = tokio::select! {
                changed = cancel_rx.changed() => changed.is_ok(),
                _ = sleep_fn(delay) => false,
            };

            if cancelled || self.cancel_requested() {
                self.cancel();
                return StopReason::Cancelled;
            }

            outcome = self.poll_once().await;
        }
    }
}
