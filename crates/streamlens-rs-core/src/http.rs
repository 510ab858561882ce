//! REST facade for prompt template management.
//!
//! Prompt CRUD is the one surface that does not ride the websocket: it talks
//! to a plain HTTP API that wraps payloads in a `{data, message}` envelope
//! and reports failures as `{error}` bodies with non-success status codes.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use streamlens_rs_config::HttpConfig;
use thiserror::Error;

/// Industry groupings the backend accepts for prompt templates.
pub const INDUSTRY_TYPES: &[&str] = &["AUTO", "MFG"];

/// Errors returned by the prompt API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure or timeout from the HTTP client.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("prompt api rejected the request (status={status}): {message}")]
    Status {
        /// HTTP status code of the response.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },
    /// A success response was missing its data payload.
    #[error("prompt api response is missing data")]
    MissingData,
}

/// A stored prompt template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptRecord {
    /// Backend identifier for the template.
    #[serde(default)]
    pub prompt_id: String,
    /// Owner of the template.
    pub user_id: String,
    /// Display name, unique per owner.
    pub topic_name: String,
    /// Industry grouping, e.g. `AUTO`.
    pub industry_type: String,
    /// System prompt text.
    pub system_prompt: String,
    /// User prompt text.
    pub user_prompt: String,
    /// Whether the template comes from the shared library.
    #[serde(default)]
    pub is_public: bool,
}

/// Fields required to create a prompt template.
#[derive(Debug, Clone, Serialize)]
pub struct NewPrompt {
    /// Owner of the template.
    pub user_id: String,
    /// Display name, unique per owner.
    pub topic_name: String,
    /// Industry grouping.
    pub industry_type: String,
    /// System prompt text.
    pub system_prompt: String,
    /// User prompt text.
    pub user_prompt: String,
}

/// Partial update for an existing template; unset fields keep their value.
///
/// Templates are addressed by `(user_id, prompt_id)`, so shared-library
/// entries cannot be rewritten under another user's id.
#[derive(Debug, Clone, Serialize)]
pub struct PromptUpdate {
    /// Owner of the template.
    pub user_id: String,
    /// Template to update.
    pub prompt_id: String,
    /// Replacement display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    /// Replacement industry grouping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_type: Option<String>,
    /// Replacement system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Replacement user prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
}

/// Identifier returned when a template is created.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreatedPrompt {
    /// Backend identifier for the new template.
    pub prompt_id: String,
}

/// `{data, message}` envelope the prompt API wraps every response in.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the prompt template API.
#[derive(Clone)]
pub struct PromptApi {
    client: reqwest::Client,
    base_url: String,
}

impl PromptApi {
    /// Build a client for the given API base URL.
    pub fn new(base_url: impl Into<String>, options: &HttpConfig) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;
        debug!(
            "prompt api client ready (base_url={}, timeout_secs={})",
            base_url, options.timeout_secs
        );
        Ok(Self { client, base_url })
    }

    /// List templates visible to a user: the shared library plus their own.
    pub async fn list(&self, user_id: &str) -> Result<Vec<PromptRecord>, ApiError> {
        let response = self
            .client
            .get(format!("{}/prompt-list", self.base_url))
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let envelope: ApiEnvelope<Vec<PromptRecord>> = read_envelope(response).await?;
        envelope.data.ok_or(ApiError::MissingData)
    }

    /// Create a new template.
    pub async fn create(&self, prompt: &NewPrompt) -> Result<CreatedPrompt, ApiError> {
        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(prompt)
            .send()
            .await?;
        let envelope: ApiEnvelope<CreatedPrompt> = read_envelope(response).await?;
        let created = envelope.data.ok_or(ApiError::MissingData)?;
        info!(
            "created prompt template (topic_name={}, prompt_id={})",
            prompt.topic_name, created.prompt_id
        );
        Ok(created)
    }

    /// Update an existing template; returns the backend's message.
    pub async fn update(&self, update: &PromptUpdate) -> Result<String, ApiError> {
        let response = self
            .client
            .put(format!("{}/prompt", self.base_url))
            .json(update)
            .send()
            .await?;
        let envelope: ApiEnvelope<Value> = read_envelope(response).await?;
        info!("updated prompt template (prompt_id={})", update.prompt_id);
        Ok(envelope.message.unwrap_or_default())
    }

    /// Delete a template; the backend's message names the deleted topic.
    pub async fn delete(&self, user_id: &str, prompt_id: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .delete(format!("{}/prompt", self.base_url))
            .json(&json!({ "user_id": user_id, "prompt_id": prompt_id }))
            .send()
            .await?;
        let envelope: ApiEnvelope<Value> = read_envelope(response).await?;
        info!("deleted prompt template (prompt_id={})", prompt_id);
        Ok(envelope.message.unwrap_or_default())
    }
}

/// Check the status code and decode the `{data, message}` envelope.
async fn read_envelope<T>(response: reqwest::Response) -> Result<ApiEnvelope<T>, ApiError>
where
    T: serde::de::DeserializeOwned + Default,
{
    let status = response.status();
    if !status.is_success() {
        let path = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        warn!(
            "prompt api request failed (path={}, status={})",
            path,
            status.as_u16()
        );
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_body_message(&body),
        });
    }
    Ok(response.json().await?)
}

/// Pull a human-readable message out of an error body.
///
/// The backend answers failures with `{"error": ...}`, older paths with
/// `{"message": ...}`, and gateway-level failures with bare text.
fn error_body_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail provided".to_string()
    } else {
        trimmed.to_string()
    }
}
