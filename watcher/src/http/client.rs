//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::errors::WatchError;

/// HTTP client for backend communication
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WatchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| WatchError::ConfigError(format!("invalid backend URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(WatchError::ConfigError(format!(
                "backend URL {base_url} cannot take a path"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    pub fn url_for(&self, segments: &[&str]) -> Result<Url, WatchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| WatchError::ConfigError(format!("backend URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a GET request to the path built from `segments`.
    ///
    /// A success body that does not match `T` is a `JsonError`, which the
    /// poll loop does not retry.
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, WatchError> {
        let url = self.url_for(segments)?;
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("HTTP GET failed: {} - {}", status, body);
            return Err(classify_status(status, url.as_str(), body));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            error!("Unexpected response body from {}: {}", url, e);
            WatchError::JsonError(e)
        })
    }
}

/// Map a non-success status onto the watcher's error taxonomy
fn classify_status(status: StatusCode, url: &str, body: String) -> WatchError {
    match status {
        StatusCode::NOT_FOUND => WatchError::NotFound(url.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            WatchError::Unavailable(format!("{}: {}", status, body))
        }
        s if s.is_server_error() => WatchError::Unavailable(format!("{}: {}", status, body)),
        _ => WatchError::Internal(format!("{}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = HttpClient::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(WatchError::ConfigError(_))));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpClient::new("http://localhost:4943/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:4943/api");
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let client = HttpClient::new("http://localhost:4943/api/v1", Duration::from_secs(1)).unwrap();
        let url = client.url_for(&["daos", "a/b?c#d"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4943/api/v1/daos/a%2Fb%3Fc%23d");

        let client = HttpClient::new("http://localhost:4943/api/", Duration::from_secs(1)).unwrap();
        let url = client.url_for(&["daos", "dao-1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4943/api/daos/dao-1");
    }

    #[test]
    fn test_new_rejects_pathless_url() {
        let result = HttpClient::new("mailto:ops@example.org", Duration::from_secs(1));
        assert!(matches!(result, Err(WatchError::ConfigError(_))));
    }

    #[test]
    fn test_classify_status() {
        let url = "http://localhost/daos/x";
        assert!(classify_status(StatusCode::NOT_FOUND, url, String::new()).is_not_found());
        assert!(classify_status(StatusCode::BAD_GATEWAY, url, String::new()).is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, url, String::new()).is_transient());

        let forbidden = classify_status(StatusCode::FORBIDDEN, url, String::new());
        assert!(!forbidden.is_transient());
        assert!(!forbidden.is_not_found());
    }
}
