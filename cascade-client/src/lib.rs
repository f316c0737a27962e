//! Cascade Control Client
//!
//! A narrow HTTP client for the uniform control interface every pipeline
//! service exposes:
//!
//! - `POST {endpoint}/control/execute` — start (or synchronously run) an
//!   operation
//! - `GET {endpoint}/control/status/{task_id}` — poll a long-running
//!   execution
//! - `GET {endpoint}/control/output/{task_id}` — fetch the output reference
//!   of a finished execution
//!
//! The client is behind the [`ControlApi`] trait so the worker loop can be
//! exercised against scripted fakes in tests.

pub mod error;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use cascade_core::domain::{DataReference, ServiceEndpoint};
use cascade_core::dto::control::{ExecuteRequest, ExecuteResponse, StatusResponse};

pub use error::{ClientError, Result};

/// The three control calls the engine issues against a service endpoint.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Starts an operation. A synchronous service answers `complete` with an
    /// output; a long-running one answers `running` with a service-assigned
    /// task id for polling.
    async fn execute(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse>;

    /// Polls a long-running execution.
    async fn status(&self, endpoint: &ServiceEndpoint, remote_task_id: &str)
        -> Result<StatusResponse>;

    /// Fetches the output reference of a finished execution.
    async fn output(
        &self,
        endpoint: &ServiceEndpoint,
        remote_task_id: &str,
    ) -> Result<DataReference>;
}

/// HTTP implementation of [`ControlApi`].
#[derive(Debug, Clone)]
pub struct HttpControlClient {
    client: Client,
}

impl HttpControlClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Creates a client from a pre-configured reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidBody(e.to_string()))
    }
}

#[async_trait]
impl ControlApi for HttpControlClient {
    async fn execute(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        let url = format!("{}/control/execute", endpoint.base_url());
        tracing::debug!(%url, method = %request.method, "execute");

        let response = self.client.post(&url).json(request).send().await?;
        self.handle_response(response).await
    }

    async fn status(
        &self,
        endpoint: &ServiceEndpoint,
        remote_task_id: &str,
    ) -> Result<StatusResponse> {
        let url = format!("{}/control/status/{}", endpoint.base_url(), remote_task_id);

        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    async fn output(
        &self,
        endpoint: &ServiceEndpoint,
        remote_task_id: &str,
    ) -> Result<DataReference> {
        let url = format!("{}/control/output/{}", endpoint.base_url(), remote_task_id);

        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }
}
