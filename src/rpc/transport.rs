//! RPC transports.
//!
//! A transport executes one query procedure and returns its JSON result. The
//! query layer never talks to the network directly; it only calls a transport
//! from inside a deduplicated fetch.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RpcConfig;
use crate::error::{FetchError, FetchResult};

/// Executes query procedures on a remote server.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Call the query procedure at `path` with optional `input`.
    async fn query(&self, path: &str, input: Option<&Value>) -> FetchResult<Value>;
}

/// Success envelope: `{"result": {"data": ...}}`.
#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    result: ResultBody,
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    #[serde(default)]
    data: Value,
}

/// Error envelope: `{"error": {"message": ..}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// JSON-over-HTTP transport: `GET {base_url}/{path}?input=<json>`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &RpcConfig) -> FetchResult<Self> {
        Self::new(cfg.base_url.clone(), cfg.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn query(&self, path: &str, input: Option<&Value>) -> FetchResult<Value> {
        let mut request = self.client.get(self.url(path));
        if let Some(input) = input {
            request = request.query(&[("input", input.to_string())]);
        }

        debug!(path, "RPC query");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(FetchError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = serde_json::from_str(&body)?;
        Ok(unwrap_envelope(value))
    }
}

/// Extract `result.data` from an enveloped response; bare bodies pass through.
fn unwrap_envelope(value: Value) -> Value {
    let is_envelope = value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get("result").is_some_and(Value::is_object));
    if !is_envelope {
        return value;
    }
    match serde_json::from_value::<ResultEnvelope>(value.clone()) {
        Ok(envelope) => envelope.result.data,
        Err(_) => value,
    }
}
