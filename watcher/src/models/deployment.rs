//! Deployment snapshot models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend timestamp in nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp from nanoseconds
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Convert to a UTC date-time
    pub fn to_datetime(&self) -> DateTime<Utc> {
        // u64 nanoseconds always fit in i64 seconds
        let secs = (self.0 / 1_000_000_000) as i64;
        let nanos = (self.0 % 1_000_000_000) as u32;
        DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Logical service instance within one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRole {
    Backend,
    Ledger,
    Swap,
}

impl UnitRole {
    /// All roles, in declaration order
    pub const ALL: [UnitRole; 3] = [UnitRole::Backend, UnitRole::Ledger, UnitRole::Swap];

    /// Wire tag of the role
    pub fn tag(&self) -> &'static str {
        match self {
            UnitRole::Backend => "backend",
            UnitRole::Ledger => "ledger",
            UnitRole::Swap => "swap",
        }
    }

    /// Look a role up by its wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        UnitRole::ALL.into_iter().find(|role| role.tag() == tag)
    }
}

impl fmt::Display for UnitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Sub-step of an in-progress deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PhaseStep {
    /// A unit instance is being created
    #[serde(rename = "creating_canister")]
    CreatingUnit(UnitRole),

    /// Code is being installed into a unit instance
    #[serde(rename = "installing_code")]
    InstallingCode(UnitRole),
}

/// Raw identifier association tree as returned by the backend.
///
/// Either an empty array, a `[role, identifier]` leaf, or an array of
/// further trees. See [`crate::decode::identifiers`].
pub type IdentifierTree = serde_json::Value;

/// Deployment status reported by one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DeploymentStatus {
    /// Waiting for the deployment pipeline to pick the request up
    Queued { queued_at: Timestamp },

    /// Pipeline is running
    Deploying { started_at: Timestamp, step: PhaseStep },

    /// Every unit is created and has its code installed
    Deployed {
        deployed_at: Timestamp,
        identifiers: IdentifierTree,
    },

    /// Pipeline stopped with an error while in `last_status`.
    ///
    /// `last_status` is never itself `Failed`.
    Failed {
        failed_at: Timestamp,
        error_message: String,
        last_status: Box<DeploymentStatus>,
    },
}

impl DeploymentStatus {
    /// Deployed and Failed end a watch session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Deployed { .. } | DeploymentStatus::Failed { .. }
        )
    }

    /// Short lowercase name of the status variant
    pub fn name(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued { .. } => "queued",
            DeploymentStatus::Deploying { .. } => "deploying",
            DeploymentStatus::Deployed { .. } => "deployed",
            DeploymentStatus::Failed { .. } => "failed",
        }
    }
}

/// One polled observation of a DAO deployment. Carries no history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSnapshot {
    /// DAO the deployment belongs to
    pub dao_id: String,

    /// When the deployment record was created
    pub created_at: Option<Timestamp>,

    /// Current status
    pub status: DeploymentStatus,
}

impl DeploymentSnapshot {
    /// Create a snapshot for the given DAO
    pub fn new(dao_id: impl Into<String>, status: DeploymentStatus) -> Self {
        Self {
            dao_id: dao_id.into(),
            created_at: None,
            status,
        }
    }

    /// Same DAO, different status. Used to project a failure's last status.
    pub fn with_status(&self, status: DeploymentStatus) -> Self {
        Self {
            dao_id: self.dao_id.clone(),
            created_at: self.created_at,
            status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
