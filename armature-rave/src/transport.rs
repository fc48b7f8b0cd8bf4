//! Gateway transport

use crate::config::RaveConfig;
use crate::error::{RaveError, RaveResult};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Request to a gateway endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    /// HTTP method
    pub method: Method,
    /// Path and query below the base URL (`/v3/charges?type=card`)
    pub path: String,
    /// JSON body
    pub body: Option<Value>,
}

impl GatewayRequest {
    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// POST request with JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    /// PUT request with JSON body
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Percent-encode a value into a single path segment.
///
/// Dot segments are rejected since URL resolution would collapse them.
pub fn path_segment(value: &str) -> RaveResult<String> {
    if matches!(value, "" | "." | "..") {
        return Err(RaveError::Validation(format!(
            "'{}' is not a usable path segment",
            value
        )));
    }
    Ok(urlencoding::encode(value).into_owned())
}

/// Raw gateway response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: u16,
    /// Unparsed body
    pub body: String,
}

impl GatewayResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends requests to the gateway.
///
/// Implementations own authentication, per-call timeouts and any
/// network-level retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the raw response.
    ///
    /// Non-2xx statuses are not errors here; the gateway puts its error
    /// envelope in the body.
    async fn send(&self, request: GatewayRequest) -> RaveResult<GatewayResponse>;
}

/// reqwest-backed transport with bearer authentication
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    secret_key: SecretString,
}

impl HttpTransport {
    /// Create a transport from client configuration
    pub fn new(config: &RaveConfig) -> RaveResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("armature-rave/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Endpoint paths resolve below the base path, so it must end in a slash
        let mut base_url = Url::parse(config.base_url())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            secret_key: SecretString::new(config.secret_key.expose_secret().into()),
        })
    }

    /// Resolve an endpoint path below the base URL, keeping any base path prefix
    pub fn url(&self, path: &str) -> RaveResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: GatewayRequest) -> RaveResult<GatewayResponse> {
        let url = self.url(&request.path)?;
        debug!(method = %request.method, url = %url, "Sending gateway request");

        let mut builder = self
            .client
            .request(request.method, url)
            .bearer_auth(self.secret_key.expose_secret())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "Gateway responded");
        Ok(GatewayResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport replaying canned responses and recording requests
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<RaveResult<GatewayResponse>>>,
        requests: Mutex<Vec<GatewayRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, body: Value) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(GatewayResponse::new(200, body.to_string())));
            self
        }

        pub fn reply_raw(self, status: u16, body: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(GatewayResponse::new(status, body)));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(RaveError::Transport(message.to_string())));
            self
        }

        pub fn repeat(self, body: Value, times: usize) -> Self {
            (0..times).fold(self, |t, _| t.reply(body.clone()))
        }

        pub fn requests(&self) -> Vec<GatewayRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: GatewayRequest) -> RaveResult<GatewayResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RaveError::Transport("no scripted response".to_string())))
        }
    }
}
