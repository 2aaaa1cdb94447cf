use crate::errors::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

/// GETs `url` and decodes the body as JSON.
///
/// The client and the response live only for this call and are released on
/// every path. Non-2xx statuses are errors.
pub async fn fetch_json(url: &str) -> Result<Value, FetchError> {
    Ok(get(url).await?.json().await?)
}

pub async fn fetch_todo(url: &str) -> Result<Todo, FetchError> {
    Ok(get(url).await?.json().await?)
}

async fn get(url: &str) -> Result<reqwest::Response, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    tracing::debug!(url, status = %response.status(), "fetched");
    Ok(response)
}
