use reqwest::{Client as ReqwestClient, ClientBuilder, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::models::{
    Capability, CapabilityPayload, DeviceSnapshot, HeartbeatResponse, LoginRequest, LoginResponse,
};
use crate::session::SessionContext;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// HTTP client for the device-management backend.
///
/// The base URL is fixed at construction. The session context is read at
/// call time on every request, so credential changes (login, logout) apply
/// to in-flight work immediately. Failed requests are never retried here:
/// reads wait for the next poll tick, writes wait for the operator.
#[derive(Clone)]
pub struct ApiClient {
    client: Arc<ReqwestClient>,
    base_url: String,
    session: SessionContext,
}

#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    session: Option<SessionContext>,
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Config("Base URL must be provided".to_string()))?;

        let client = ClientBuilder::new()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(ApiError::Network)?;

        Ok(ApiClient {
            client: Arc::new(client),
            base_url,
            session: self.session.unwrap_or_default(),
        })
    }
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Result<Self> {
        Self::builder().base_url(base_url).session(session).build()
    }

    async fn send<T>(&self, method: Method, path: &str, body: Option<&T>) -> Result<reqwest::Response>
    where
        T: Serialize + Send + Sync,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut request = self.client.request(method, &url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::Network)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Unknown error"));
        error!("Server error: {} - {}", status, message);
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn request<T, R>(&self, method: Method, path: &str, body: Option<&T>) -> Result<R>
    where
        T: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let response = self.send(method, path, body).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Authenticate and obtain a session token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let credentials = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response: LoginResponse = self
            .request(Method::POST, "/login", Some(&credentials))
            .await?;
        Ok(response.token)
    }

    /// Fetch the whole fleet, in server response order.
    #[instrument(skip(self))]
    pub async fn fetch_fleet(&self) -> Result<Vec<DeviceSnapshot>> {
        self.request::<(), _>(Method::GET, "/devices", None).await
    }

    /// Fetch one device's current snapshot.
    #[instrument(skip(self))]
    pub async fn fetch_status(&self, device_id: &str) -> Result<DeviceSnapshot> {
        self.request::<(), _>(Method::GET, &format!("/devices/{}/status", device_id), None)
            .await
    }

    /// Ping the device's heartbeat endpoint. A write whose response doubles
    /// as a read of the updated heartbeat time.
    #[instrument(skip(self))]
    pub async fn heartbeat(&self, device_id: &str) -> Result<HeartbeatResponse> {
        self.request::<(), _>(
            Method::POST,
            &format!("/devices/{}/heartbeat", device_id),
            None,
        )
        .await
    }

    /// Issue a capability toggle command. The response carries nothing the
    /// cache needs; the caller re-fetches to reconcile.
    #[instrument(skip(self))]
    pub async fn set_capability(
        &self,
        device_id: &str,
        capability: Capability,
        enabled: bool,
    ) -> Result<()> {
        let payload = CapabilityPayload { enabled };
        self.send(
            Method::POST,
            &format!("/devices/{}/{}", device_id, capability.endpoint()),
            Some(&payload),
        )
        .await?;
        Ok(())
    }
}
