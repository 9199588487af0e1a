//! HTTP implementation of [`CloudStore`].
//!
//! JSON over HTTP: `GET {base}/{collection}` returns an array of documents,
//! `PUT {base}/{collection}/{id}` upserts one document. The agent carries a
//! global request timeout so a hung network call fails instead of holding
//! the engine's sync lock indefinitely.

use serde_json::Value;
use ureq::Agent;

use tally_config::CloudConfig;

use crate::cloud::CloudStore;
use crate::error::{Result, SyncError};

/// JSON-over-HTTP cloud store adapter.
pub struct HttpCloudStore {
    agent: Agent,
    base_url: String,
    api_token: Option<String>,
}

impl HttpCloudStore {
    /// Builds an adapter from the cloud section of the configuration.
    pub fn new(config: &CloudConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build();
        Self {
            agent: agent_config.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    fn bearer(&self) -> Option<String> {
        self.api_token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

impl CloudStore for HttpCloudStore {
    fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>> {
        let url = self.collection_url(collection);
        let mut request = self.agent.get(url.as_str());
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", auth.as_str());
        }

        let mut response = request
            .call()
            .map_err(|e| SyncError::cloud("fetch", collection, e))?;
        let docs: Vec<Value> = response
            .body_mut()
            .read_json()
            .map_err(|e| SyncError::cloud("fetch", collection, e))?;
        Ok(docs)
    }

    fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<()> {
        let url = self.record_url(collection, id);
        let mut request = self.agent.put(url.as_str());
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", auth.as_str());
        }

        request
            .send_json(doc)
            .map_err(|e| SyncError::cloud("upsert", collection, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(base_url: &str) -> HttpCloudStore {
        HttpCloudStore::new(&CloudConfig {
            base_url: base_url.to_string(),
            api_token: None,
            timeout_secs: 1,
        })
    }

    #[test]
    fn urls_normalise_trailing_slash() {
        let cloud = adapter("https://api.example.com/v1/");
        assert_eq!(
            cloud.collection_url("notes"),
            "https://api.example.com/v1/notes"
        );
        assert_eq!(
            cloud.record_url("notes", "nt-abc"),
            "https://api.example.com/v1/notes/nt-abc"
        );
    }

    #[test]
    fn unreachable_host_is_a_cloud_error() {
        // Nothing listens on port 1; the connect fails fast.
        let cloud = adapter("http://127.0.0.1:1");
        let err = cloud.fetch_collection("notes").unwrap_err();
        assert!(matches!(err, SyncError::Cloud { .. }));
    }
}
