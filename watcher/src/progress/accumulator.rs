//! Session-scoped progress accumulator

use indexmap::IndexSet;
use tracing::debug;

use crate::models::deployment::{DeploymentSnapshot, DeploymentStatus, PhaseStep, UnitRole};

/// First-observed ordering of units across the snapshots of one session.
///
/// Both orders are append-only: a role is added the first time a snapshot
/// reports it and is never removed or moved afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressAccumulator {
    creation_order: IndexSet<UnitRole>,
    install_order: IndexSet<UnitRole>,
}

impl ProgressAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a snapshot into the accumulator.
    ///
    /// Returns true if a previously unseen role was appended.
    pub fn ingest(&mut self, snapshot: &DeploymentSnapshot) -> bool {
        let DeploymentStatus::Deploying { step, .. } = &snapshot.status else {
            return false;
        };

        let (order, role) = match *step {
            PhaseStep::CreatingUnit(role) => (&mut self.creation_order, role),
            PhaseStep::InstallingCode(role) => (&mut self.install_order, role),
        };

        let appended = order.insert(role);
        if appended {
            debug!(
                "DAO {}: first sighting of {:?}, position {}",
                snapshot.dao_id,
                step,
                order.len() - 1
            );
        }
        appended
    }

    /// Roles in the order their creation was first observed
    pub fn creation_order(&self) -> &IndexSet<UnitRole> {
        &self.creation_order
    }

    /// Roles in the order their code installation was first observed
    pub fn install_order(&self) -> &IndexSet<UnitRole> {
        &self.install_order
    }

    pub fn creation_index(&self, role: UnitRole) -> Option<usize> {
        self.creation_order.get_index_of(&role)
    }

    pub fn install_index(&self, role: UnitRole) -> Option<usize> {
        self.install_order.get_index_of(&role)
    }

    /// Number of roles recorded across both orders
    pub fn observed(&self) -> usize {
        self.creation_order.len() + self.install_order.len()
    }
}
