//! Transport layer: the injected "send one request" dependency.
//!
//! Orchestrators never talk to the network directly. They hold an
//! `Arc<dyn Transport>` captured at build time, which is either passed in
//! explicitly or taken from the process-wide default slot managed here.

pub mod http;

pub use http::HttpTransport;

use crate::config::ClientConfig;
use crate::request::RequestDescriptor;
use crate::Result;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A settled, successful request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Decoded payload ("data").
    pub body: Value,
}

impl Response {
    /// A 200 response carrying `body`.
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.body)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Sends one request and resolves with its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> std::result::Result<Response, TransportError>;
}

/// Adapts a closure into a [`Transport`].
pub struct FnTransport<F> {
    f: F,
}

impl<F> FnTransport<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Response, TransportError>> + Send + 'static,
{
    async fn send(&self, request: RequestDescriptor) -> std::result::Result<Response, TransportError> {
        (self.f)(request).await
    }
}

/// Shorthand for `Arc::new(FnTransport::new(f))`.
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Transport>
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Response, TransportError>> + Send + 'static,
{
    Arc::new(FnTransport::new(f))
}

/// Send through `transport`; a panic inside it settles as [`TransportError::Other`].
pub(crate) async fn send_caught(
    transport: &dyn Transport,
    request: RequestDescriptor,
) -> std::result::Result<Response, TransportError> {
    match AssertUnwindSafe(transport.send(request)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(TransportError::Other(format!(
            "transport panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

static DEFAULT_TRANSPORT: ArcSwapOption<Arc<dyn Transport>> = ArcSwapOption::const_empty();

/// Replace the process-wide default transport.
///
/// Only orchestrators built afterwards pick it up; existing ones keep the
/// transport they captured.
pub fn provide_transport(transport: Arc<dyn Transport>) {
    DEFAULT_TRANSPORT.store(Some(Arc::new(transport)));
}

/// Clear the default slot so the next lookup builds a fresh [`HttpTransport`].
pub fn reset_transport() {
    DEFAULT_TRANSPORT.store(None);
}

/// The process-wide default transport, building an [`HttpTransport`] from
/// [`ClientConfig::from_env`] on first use.
pub fn default_transport() -> Result<Arc<dyn Transport>> {
    if let Some(t) = DEFAULT_TRANSPORT.load_full() {
        return Ok(Arc::clone(&*t));
    }

    let built: Arc<dyn Transport> = Arc::new(HttpTransport::new(ClientConfig::from_env())?);
    // Keep whatever another caller stored in the meantime.
    DEFAULT_TRANSPORT.rcu(|current| {
        let existing: Option<Arc<Arc<dyn Transport>>> = current.clone();
        existing.or_else(|| Some(Arc::new(Arc::clone(&built))))
    });

    Ok(DEFAULT_TRANSPORT
        .load_full()
        .map(|t| Arc::clone(&*t))
        .unwrap_or(built))
}
