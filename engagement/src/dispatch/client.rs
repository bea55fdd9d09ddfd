//! Defense endpoint client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::payload::DispatchPayload;
use super::rules::ResponseClass;

/// Errors from a single dispatch call
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No endpoint configured for {0}")]
    NoEndpoint(ResponseClass),

    #[error("{class} endpoint returned HTTP {status}")]
    Status { class: ResponseClass, status: u16 },

    #[error("{class} endpoint unreachable: {reason}")]
    Transport { class: ResponseClass, reason: String },

    #[error("{class} endpoint timed out")]
    Timeout { class: ResponseClass },

    #[error("{class} endpoint returned an invalid body: {reason}")]
    InvalidResponse { class: ResponseClass, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Acknowledgement returned by a defense agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseAck {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Anything that can deliver a dispatch payload to a defense agent
#[async_trait]
pub trait DefenseClient: Send + Sync {
    /// Deliver one payload; any non-200 or transport failure is an error.
    async fn dispatch(
        &self,
        class: ResponseClass,
        payload: &DispatchPayload,
    ) -> DispatchResult<DefenseAck>;

    /// Endpoint label used for health tracking
    fn endpoint(&self, class: ResponseClass) -> String {
        class.to_string()
    }
}

/// reqwest-backed client, one URL per response class
pub struct HttpDefenseClient {
    endpoints: HashMap<ResponseClass, String>,
    client: reqwest::Client,
}

impl HttpDefenseClient {
    pub fn new(endpoints: HashMap<ResponseClass, String>, timeout: Duration) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;
        Ok(Self { endpoints, client })
    }
}

#[async_trait]
impl DefenseClient for HttpDefenseClient {
    async fn dispatch(
        &self,
        class: ResponseClass,
        payload: &DispatchPayload,
    ) -> DispatchResult<DefenseAck> {
        let url = self
            .endpoints
            .get(&class)
            .ok_or(DispatchError::NoEndpoint(class))?;
        debug!(class = %class, url = %url, "Posting dispatch payload");

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout { class }
                } else {
                    DispatchError::Transport {
                        class,
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DispatchError::Status {
                class,
                status: status.as_u16(),
            });
        }

        response
            .json::<DefenseAck>()
            .await
            .map_err(|e| DispatchError::InvalidResponse {
                class,
                reason: e.to_string(),
            })
    }

    fn endpoint(&self, class: ResponseClass) -> String {
        self.endpoints
            .get(&class)
            .cloned()
            .unwrap_or_else(|| class.to_string())
    }
}
