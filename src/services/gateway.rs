//! Minimal HTTP request/response gateway to the external test service.
//!
//! One request per call with its own timeout. Non-2xx statuses are returned to
//! the caller, never raised.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

/// HTTP connect timeout for outbound calls.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client shared by the gateway, the package mirror calls and the webhook.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}

/// Transport-level failure; the server never produced a response.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request to {url} timed out after {}s", timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl GatewayRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
            timeout,
        }
    }
}

/// Whatever the server answered.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub duration: Duration,
}

impl GatewayResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait HttpGateway: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

/// Gateway backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestGateway {
    client: reqwest::Client,
}

impl ReqwestGateway {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_client()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpGateway for ReqwestGateway {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let GatewayRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method, &url).timeout(timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &body {
            builder = builder.body(body.to_string());
        }

        let started = Instant::now();
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    url: url.clone(),
                    timeout,
                }
            } else {
                GatewayError::Transport {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        };

        let response = builder.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(map_err)?;

        Ok(GatewayResponse {
            status,
            headers,
            body,
            duration: started.elapsed(),
        })
    }
}
