use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::{ServiceUrl, Settings};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
}

/// Thin reqwest wrapper shared by the service clients: base url, bearer token, error mapping.
#[derive(Debug, Clone)]
pub(crate) struct ServiceHttp {
    client: Client,
    base_url: ServiceUrl,
    access_token: Option<String>,
}

impl ServiceHttp {
    pub(crate) fn new(settings: &Settings, base_url: ServiceUrl) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.http().connect_timeout())
            .timeout(settings.http().request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url, access_token: settings.services().access_token.clone() })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &str,
    ) -> Result<T, ServiceError> {
        let body = self.send(self.client.get(self.base_url.join(path)), resource).await?;
        decode(&body)
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
        resource: &str,
    ) -> Result<T, ServiceError> {
        let body = self.post_raw(path, payload, resource).await?;
        decode(&body)
    }

    pub(crate) async fn post_raw<B: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &B,
        resource: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        self.send(self.client.post(self.base_url.join(path)).json(payload), resource).await
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Vec<u8>, ServiceError> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|err| {
            tracing::warn!(resource, error = %err, "HTTP request failed");
            ServiceError::Network(err.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ServiceError::Network(format!("failed to read response body: {err}")))?;

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound { resource: resource.to_string() });
        }
        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&body)
                .map(|payload| extract_error_message(&payload))
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
            tracing::warn!(resource, status = status.as_u16(), message = %message, "Service returned error status");
            return Err(ServiceError::Network(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        Ok(body.to_vec())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|err| ServiceError::InvalidPayload(err.to_string()))
}

fn extract_error_message(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .or_else(|| payload.get("detail").and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| payload.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown_error".to_string())
}
