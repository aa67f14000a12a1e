//! Registry of concurrent watch sessions, keyed by DAO id

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, select_all};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::errors::WatchError;
use crate::http::explorer::SnapshotSource;
use crate::watch::controller::{CancelHandle, Options, PollingController, WatchEvent};
use crate::watch::fsm::StopReason;

struct WatchHandle {
    cancel: CancelHandle,
    join: JoinHandle<StopReason>,
}

/// Owns one controller task per watched DAO. Sessions share nothing but
/// the snapshot source and the event channel.
pub struct WatchRegistry<S: SnapshotSource + ?Sized + 'static> {
    source: Arc<S>,
    options: Options,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    sessions: HashMap<String, WatchHandle>,
}

impl<S: SnapshotSource + ?Sized + 'static> WatchRegistry<S> {
    pub fn new(
        source: Arc<S>,
        options: Options,
        events_tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Self {
        Self {
            source,
            options,
            events_tx,
            sessions: HashMap::new(),
        }
    }

    /// Spawn a session for `dao_id`. At most one live session per DAO.
    pub fn watch(&mut self, dao_id: &str) -> Result<(), WatchError> {
        self.prune();
        if self.sessions.contains_key(dao_id) {
            return Err(WatchError::AlreadyWatching(dao_id.to_string()));
        }

        let controller = PollingController::new(
            dao_id,
            self.source.clone(),
            self.options.clone(),
            self.events_tx.clone(),
        );
        let cancel = controller.cancel_handle();
        let join = tokio::spawn(controller.run(tokio::time::sleep));

        self.sessions
            .insert(dao_id.to_string(), WatchHandle { cancel, join });
        Ok(())
    }

    /// Cancel the session for `dao_id`. Returns false if there was none.
    pub fn cancel(&mut self, dao_id: &str) -> bool {
        match self.sessions.get(dao_id) {
            Some(handle) => {
                info!("Cancelling watch for DAO {}", dao_id);
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (dao_id, handle) in &self.sessions {
            if !handle.join.is_finished() {
                info!("Cancelling watch for DAO {}", dao_id);
            }
            handle.cancel.cancel();
        }
    }

    /// Whether a live session exists for `dao_id`
    pub fn is_watching(&self, dao_id: &str) -> bool {
        self.sessions
            .get(dao_id)
            .map(|handle| !handle.join.is_finished())
            .unwrap_or(false)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions
            .values()
            .filter(|handle| !handle.join.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next session to stop and forget it.
    ///
    /// Returns `None` when no sessions are left.
    pub async fn wait_any(&mut self) -> Option<(String, StopReason)> {
        if self.sessions.is_empty() {
            return None;
        }

        let (ids, joins): (Vec<&String>, Vec<&mut JoinHandle<StopReason>>) = self
            .sessions
            .iter_mut()
            .map(|(dao_id, handle)| (dao_id, &mut handle.join))
            .unzip();
        let (result, index, _) = select_all(joins).await;
        let dao_id = ids[index].clone();

        self.sessions.remove(&dao_id);
        let reason = stop_reason_of(&dao_id, result);
        Some((dao_id, reason))
    }

    /// Wait for every session to stop
    pub async fn join_all(&mut self) -> Vec<(String, StopReason)> {
        let (ids, joins): (Vec<_>, Vec<_>) = self
            .sessions
            .drain()
            .map(|(dao_id, handle)| (dao_id, handle.join))
            .unzip();

        ids.into_iter()
            .zip(join_all(joins).await)
            .map(|(dao_id, result)| {
                let reason = stop_reason_of(&dao_id, result);
                (dao_id, reason)
            })
            .collect()
    }

    fn prune(&mut self) {
        self.sessions.retain(|_, handle| !handle.join.is_finished());
    }
}

/// A task that panicked or was aborted counts as an error stop
fn stop_reason_of(dao_id: &str, result: Result<StopReason, JoinError>) -> StopReason {
    result.unwrap_or_else(|e| {
        warn!("Watch task for DAO {} ended abnormally: {}", dao_id, e);
        StopReason::Error
    })
}
