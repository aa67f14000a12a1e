//! API models

use serde::{Deserialize, Serialize};

/// Response of `GET /daos/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetDaoResponse {
    /// Registry entry, absent when the DAO id is unknown
    #[serde(default)]
    pub dao: Option<DaoEntry>,

    /// Deployment record, absent until the deployment has been queued
    #[serde(default)]
    pub deployment: Option<DeploymentRecord>,
}

/// DAO registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaoEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: serde_json::Value,
    #[serde(default)]
    pub creator: serde_json::Value,
}

impl DaoEntry {
    /// Textual form of the creator principal.
    ///
    /// The backend renders principals either as plain text or as
    /// `{"__principal__": "<text>"}`.
    pub fn creator_text(&self) -> Option<&str> {
        match &self.creator {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map.get("__principal__").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// Raw deployment record
///
/// `status` is a one-key variant record and `canister_ids` a nested
/// association list; both are decoded by the watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub status: serde_json::Value,
    #[serde(default)]
    pub created_at: serde_json::Value,
    #[serde(default)]
    pub canister_ids: serde_json::Value,
}
