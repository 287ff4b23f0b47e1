use super::{Response, Transport, TransportError};
use crate::config::ClientConfig;
use crate::request::RequestDescriptor;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Proxy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// [`Transport`] backed by a pooled `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout))
            // Conservative HTTP/2 keepalive defaults for long-lived connections.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url '{}'", proxy_url),
                    ErrorContext::new()
                        .with_field_path("proxy")
                        .with_details(e.to_string())
                        .with_source("http_transport"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL for `request`: `url` joined onto the descriptor's base, else the configured base.
    pub fn resolve_url(&self, request: &RequestDescriptor) -> std::result::Result<url::Url, TransportError> {
        let raw = request
            .url
            .as_deref()
            .ok_or_else(|| TransportError::InvalidRequest("request has no url".to_string()))?;

        let base = request
            .base_url
            .as_deref()
            .or(self.config.base_url.as_deref());

        let parsed = match base {
            Some(base) => url::Url::parse(base).and_then(|b| b.join(raw)),
            None => url::Url::parse(raw),
        };
        parsed.map_err(|e| TransportError::InvalidRequest(format!("cannot resolve url '{}': {}", raw, e)))
    }

    fn decode_body(bytes: &Bytes) -> Value {
        if bytes.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RequestDescriptor) -> std::result::Result<Response, TransportError> {
        let url = self.resolve_url(&request)?;
        let method = request.effective_method();
        let request_id = Uuid::new_v4().to_string();
        debug!(%method, %url, request_id = %request_id, "sending request");

        let mut req = self.client.request(method.into(), url);

        for (k, v) in &self.config.default_headers {
            let overridden = request
                .headers
                .as_ref()
                .map(|h| h.keys().any(|hk| hk.eq_ignore_ascii_case(k)))
                .unwrap_or(false);
            if !overridden {
                req = req.header(k, v);
            }
        }
        if let Some(headers) = &request.headers {
            for (k, v) in headers {
                req = req.header(k, v);
            }
        }
        req = req.header(REQUEST_ID_HEADER, &request_id);

        if let Some(params) = &request.params {
            req = req.query(params);
        }
        if let Some(data) = &request.data {
            req = req.json(data);
        }
        if let Some(ms) = request.timeout_ms {
            req = req.timeout(Duration::from_millis(ms));
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let bytes = resp.bytes().await?;

        if !(200..300).contains(&status) {
            warn!(status, request_id = %request_id, "request failed with non-success status");
            return Err(TransportError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(Response {
            status,
            headers,
            body: Self::decode_body(&bytes),
        })
    }
}
