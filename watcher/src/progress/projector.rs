//! Snapshot projection into checklist step descriptors

use serde::Serialize;

use crate::models::deployment::{DeploymentSnapshot, DeploymentStatus, PhaseStep, Timestamp};
use crate::progress::accumulator::ProgressAccumulator;

const QUEUED_ITEMS: [&str; 2] = ["Request received", "Initializing process..."];
const FINALIZE_ITEMS: [&str; 2] = ["Finalizing deployment", "Finished deploying"];

/// Top-level deployment stage shown by the checklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Queued,
    Creating,
    Installing,
    Finalizing,
    Failed,
}

impl Phase {
    /// Checklist index of the phase; failures sit outside the sequence
    pub fn index(&self) -> i32 {
        match self {
            Phase::Queued => 0,
            Phase::Creating => 1,
            Phase::Installing => 2,
            Phase::Finalizing => 3,
            Phase::Failed => -1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Queued => "Queue",
            Phase::Creating => "Creating Canisters",
            Phase::Installing => "Installing Code",
            Phase::Finalizing => "Finishing",
            Phase::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finalizing | Phase::Failed)
    }
}

/// Normalized view of one snapshot, recomputed on every poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub phase: Phase,
    pub phase_index: i32,
    pub phase_name: String,
    pub current_action_text: String,
    /// Checklist labels for the current phase
    pub items: Vec<String>,
    pub completed_item_indices: Vec<usize>,
    pub current_item_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
}

impl StepDescriptor {
    fn new(phase: Phase, action: String) -> Self {
        Self {
            phase,
            phase_index: phase.index(),
            phase_name: phase.name().to_string(),
            current_action_text: action,
            items: Vec::new(),
            completed_item_indices: Vec::new(),
            current_item_index: 0,
            started_at: None,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Fixed checklist with every item already done
    fn all_complete(mut self, items: &[&str]) -> Self {
        self.items = items.iter().map(|s| s.to_string()).collect();
        self.completed_item_indices = (0..items.len()).collect();
        self.current_item_index = items.len().saturating_sub(1);
        self
    }

    /// Checklist built from a first-observed order.
    ///
    /// Everything before the current item counts as complete. This is
    /// inferred from observation order, not confirmed by the backend.
    fn from_order(mut self, items: Vec<String>, current: Option<usize>) -> Self {
        let current = current.unwrap_or(0);
        self.items = items;
        self.completed_item_indices = (0..current).collect();
        self.current_item_index = current;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Project a snapshot against the session's accumulated ordering
pub fn project(snapshot: &DeploymentSnapshot, acc: &ProgressAccumulator) -> StepDescriptor {
    match &snapshot.status {
        DeploymentStatus::Queued { queued_at } => {
            let mut desc = StepDescriptor::new(Phase::Queued, "Deployment queued".to_string())
                .all_complete(&QUEUED_ITEMS);
            desc.started_at = Some(*queued_at);
            desc
        }
        DeploymentStatus::Deploying { started_at, step } => {
            let mut desc = project_step(*step, acc);
            desc.started_at = Some(*started_at);
            desc
        }
        DeploymentStatus::Deployed { deployed_at, .. } => {
            let mut desc = StepDescriptor::new(Phase::Finalizing, "Deployment complete".to_string())
                .all_complete(&FINALIZE_ITEMS);
            desc.completed_at = Some(*deployed_at);
            desc
        }
        DeploymentStatus::Failed {
            failed_at,
            error_message,
            last_status,
        } => {
            let inner = match last_status.as_ref() {
                DeploymentStatus::Failed { .. } => None,
                status => Some(project(&snapshot.with_status(status.clone()), acc)),
            };

            let action = match &inner {
                Some(inner) => format!(
                    "Deployment failed: {} (while {})",
                    error_message,
                    lowercase_first(inner.current_action_text.trim_end_matches("..."))
                ),
                None => format!("Deployment failed: {}", error_message),
            };

            let mut desc = StepDescriptor::new(Phase::Failed, action);
            desc.started_at = inner.and_then(|d| d.started_at);
            desc.failed_at = Some(*failed_at);
            desc
        }
    }
}

fn project_step(step: PhaseStep, acc: &ProgressAccumulator) -> StepDescriptor {
    match step {
        PhaseStep::CreatingUnit(role) => {
            let items = acc
                .creation_order()
                .iter()
                .map(|r| format!("Create {} instance", r))
                .collect();
            StepDescriptor::new(Phase::Creating, format!("Creating {} instance...", role))
                .from_order(items, acc.creation_index(role))
        }
        PhaseStep::InstallingCode(role) => {
            let items = acc
                .install_order()
                .iter()
                .map(|r| format!("Install {} code", r))
                .collect();
            StepDescriptor::new(Phase::Installing, format!("Installing {} code...", role))
                .from_order(items, acc.install_index(role))
        }
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
