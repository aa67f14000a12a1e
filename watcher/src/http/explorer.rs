//! Explorer API client

use async_trait::async_trait;
use tracing::debug;

use explorer_api::models::GetDaoResponse;

use crate::decode::snapshot::decode_record;
use crate::errors::WatchError;
use crate::http::client::HttpClient;
use crate::models::deployment::DeploymentSnapshot;

/// Source of deployment snapshots, one per call
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current deployment snapshot for `dao_id`.
    ///
    /// `Ok(None)` means the DAO exists but no deployment record has been
    /// created yet. A DAO the backend does not know is `WatchError::NotFound`.
    async fn fetch_snapshot(&self, dao_id: &str) -> Result<Option<DeploymentSnapshot>, WatchError>;
}

/// Explorer backend client
pub struct ExplorerClient {
    http_client: HttpClient,
}

impl ExplorerClient {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    /// Get the raw DAO record
    pub async fn get_dao(&self, dao_id: &str) -> Result<GetDaoResponse, WatchError> {
        self.http_client.get(&["daos", dao_id]).await
    }
}

#[async_trait]
impl SnapshotSource for ExplorerClient {
    async fn fetch_snapshot(&self, dao_id: &str) -> Result<Option<DeploymentSnapshot>, WatchError> {
        let response = self.get_dao(dao_id).await?;
        snapshot_from_response(dao_id, &response)
    }
}

/// Interpret an explorer response for `dao_id`
pub fn snapshot_from_response(
    dao_id: &str,
    response: &GetDaoResponse,
) -> Result<Option<DeploymentSnapshot>, WatchError> {
    if response.dao.is_none() {
        return Err(WatchError::NotFound(format!("DAO {}", dao_id)));
    }

    let Some(record) = &response.deployment else {
        debug!("DAO {} has no deployment record yet", dao_id);
        return Ok(None);
    };

    Ok(Some(decode_record(dao_id, record)?))
}
