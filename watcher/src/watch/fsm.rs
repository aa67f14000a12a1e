//! Finite state machine for a watch session

use serde::Serialize;

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Deployment finished successfully
    Deployed,

    /// Deployment reported a failure
    Failed,

    /// The DAO does not exist
    NotFound,

    /// The session could not continue (undecodable record, error budget spent)
    Error,

    /// The owner cancelled the session
    Cancelled,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// Created, no fetch issued yet
    Idle,

    /// Polling
    Watching,

    /// Terminal
    Stopped,
}

/// Controller event
#[derive(Debug, Clone, Copy)]
pub enum ControllerEvent {
    /// Begin polling
    Start,

    /// A terminal observation ended the session
    Terminal(StopReason),

    /// The owner tore the session down
    Cancel,
}

/// Session FSM
#[derive(Debug, Clone)]
pub struct ControllerFsm {
    state: ControllerState,
    stop_reason: Option<StopReason>,
}

impl ControllerFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: ControllerState::Idle,
            stop_reason: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Reason the session stopped, once stopped
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_watching(&self) -> bool {
        self.state == ControllerState::Watching
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ControllerEvent) -> Result<(), String> {
        let new_state = match (self.state, event) {
            (ControllerState::Idle, ControllerEvent::Start) => ControllerState::Watching,

            // Cancel before the first fetch needs no teardown beyond the state change
            (ControllerState::Idle, ControllerEvent::Cancel)
            | (ControllerState::Watching, ControllerEvent::Cancel) => {
                self.stop_reason = Some(StopReason::Cancelled);
                ControllerState::Stopped
            }

            (ControllerState::Watching, ControllerEvent::Terminal(reason)) => {
                self.stop_reason = Some(reason);
                ControllerState::Stopped
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for ControllerFsm {
    fn default() -> Self {
        Self::new()
    }
}
