use std::env;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use storage::remote::{RemoteError, RemoteProgressStore};
use study_core::model::{ProgressRecord, TaskId, UserId};

use crate::error::RestConfigError;

const DEFAULT_TABLE: &str = "user_progress";

/// Connection settings for a PostgREST-style progress table.
#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    /// User access token; requests fall back to the API key when absent.
    pub access_token: Option<String>,
    pub table: String,
}

impl RestConfig {
    /// # Errors
    ///
    /// Returns `RestConfigError` when the URL or API key is blank.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RestConfigError> {
        let base_url = base_url.into();
        let api_key = api_key.into();
        if base_url.trim().is_empty() {
            return Err(RestConfigError::MissingUrl);
        }
        if api_key.trim().is_empty() {
            return Err(RestConfigError::MissingApiKey);
        }
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            api_key: api_key.trim().to_owned(),
            access_token: None,
            table: DEFAULT_TABLE.to_owned(),
        })
    }

    /// Read `TRACKER_REMOTE_URL`, `TRACKER_REMOTE_KEY` and the optional
    /// `TRACKER_REMOTE_TOKEN`. `None` when the remote is not configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("TRACKER_REMOTE_URL").ok()?;
        let api_key = env::var("TRACKER_REMOTE_KEY").ok()?;
        let mut config = Self::new(base_url, api_key).ok()?;
        config.access_token = env::var("TRACKER_REMOTE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Some(config)
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

/// [`RemoteProgressStore`] over HTTP.
#[derive(Clone)]
pub struct RestProgressStore {
    client: Client,
    config: RestConfig,
}

impl RestProgressStore {
    #[must_use]
    pub fn new(config: RestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
    }
}

fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl RemoteProgressStore for RestProgressStore {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.config.table_url())
            .query(&[("on_conflict", "user_id,task_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record);
        let response = self.authorize(request).send().await.map_err(network)?;
        check(response).await?;
        tracing::debug!(task = %record.task_id, "remote upsert ok");
        Ok(())
    }

    async fn delete_progress(&self, user_id: &UserId, task_id: &TaskId) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.config.table_url())
            .query(&[("user_id", eq(user_id.as_str())), ("task_id", eq(task_id.as_str()))]);
        let response = self.authorize(request).send().await.map_err(network)?;
        check(response).await?;
        tracing::debug!(task = %task_id, "remote delete ok");
        Ok(())
    }

    async fn list_progress(&self, user_id: &UserId) -> Result<Vec<ProgressRecord>, RemoteError> {
        let request = self
            .client
            .get(self.config.table_url())
            .query(&[("user_id", eq(user_id.as_str())), ("select", "*".to_owned())]);
        let response = self.authorize(request).send().await.map_err(network)?;
        let body = check(response).await?.text().await.map_err(network)?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Payload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_blank_values() {
        assert!(matches!(
            RestConfig::new("  ", "key"),
            Err(RestConfigError::MissingUrl)
        ));
        assert!(matches!(
            RestConfig::new("https://db.example", ""),
            Err(RestConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn table_url_ignores_trailing_slash() {
        let config = RestConfig::new("https://db.example/", "key").unwrap();
        assert_eq!(config.table_url(), "https://db.example/rest/v1/user_progress");
        assert_eq!(config.access_token, None);

        let config = config.with_access_token("jwt");
        assert_eq!(config.access_token.as_deref(), Some("jwt"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let config = RestConfig::new("http://127.0.0.1:1", "key").unwrap();
        let store = RestProgressStore::new(config);
        let err = store.list_progress(&UserId::new("u1")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
    }
}
