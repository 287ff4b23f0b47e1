//! Load-on-construction request for a fixed descriptor.

use crate::request::{IntoRequest, Method, RequestDescriptor};
use crate::runtime;
use crate::transport::{self, Response, Transport, TransportError};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Behaviour switches for a [`DataRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRequestOptions {
    /// Issue the request on construction and on every retry.
    pub will_run: bool,
    /// Cancel the previous run whenever a new one starts.
    pub cancelable: bool,
}

impl Default for DataRequestOptions {
    fn default() -> Self {
        Self {
            will_run: true,
            cancelable: false,
        }
    }
}

impl DataRequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_will_run(mut self, will_run: bool) -> Self {
        self.will_run = will_run;
        self
    }

    pub fn with_cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }
}

/// Published state of a [`DataRequest`].
#[derive(Debug, Clone)]
pub struct DataSnapshot {
    pub loading: bool,
    /// Run sequence; 0 until the first request is issued.
    pub generation: u64,
    pub retries_count: u64,
    pub data: Option<Value>,
    pub response: Option<Response>,
    pub error: Option<Arc<TransportError>>,
}

struct DataInner {
    request: RequestDescriptor,
    transport: Arc<dyn Transport>,
    cancelable: bool,
    will_run: Mutex<bool>,
    current: Mutex<Option<CancellationToken>>,
    published: watch::Sender<DataSnapshot>,
}

impl DataInner {
    fn will_run(&self) -> bool {
        *self.will_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in a fresh token for the next run, returning the previous one.
    fn replace_token(&self, token: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, token)
    }

    fn run(self: &Arc<Self>, handle: &Handle) -> u64 {
        let token = CancellationToken::new();
        if let Some(previous) = self.replace_token(Some(token.clone())) {
            if self.cancelable {
                previous.cancel();
            }
        }

        let mut generation = 0;
        self.published.send_modify(|s| {
            s.generation += 1;
            s.loading = true;
            s.error = None;
            generation = s.generation;
        });
        debug!(generation, url = ?self.request.url, "data request started");

        let inner = Arc::clone(self);
        let request = self.request.clone();
        handle.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(TransportError::Cancelled),
                res = transport::send_caught(inner.transport.as_ref(), request) => res,
            };

            if matches!(&result, Err(e) if e.is_cancelled()) {
                debug!(generation, "data request cancelled");
                return;
            }

            let published = inner.published.send_if_modified(|s| {
                if s.generation != generation {
                    return false;
                }
                s.loading = false;
                match result {
                    Ok(response) => {
                        s.data = Some(response.body.clone());
                        s.response = Some(response);
                    }
                    Err(err) => s.error = Some(Arc::new(err)),
                }
                true
            });
            if published {
                info!(generation, "data request settled");
            } else {
                debug!(generation, "dropping result of superseded run");
            }
        });

        generation
    }
}

/// Request issued as soon as it is built, re-issued on `retry`.
///
/// Issuing a request needs a Tokio runtime; outside one, `start`, `retry`
/// and `set_will_run(true)` return a `Runtime` error and change nothing.
#[derive(Clone)]
pub struct DataRequest {
    inner: Arc<DataInner>,
}

impl DataRequest {
    pub fn builder(request: impl IntoRequest) -> Result<DataRequestBuilder> {
        Ok(DataRequestBuilder::new(request.into_request()?))
    }

    /// Re-issue the request. Counted in `retries_count` even when `will_run`
    /// is off, in which case nothing is sent and the current generation is returned.
    pub fn retry(&self) -> Result<u64> {
        let handle = if self.inner.will_run() {
            Some(runtime::current_handle("data_request")?)
        } else {
            None
        };
        let mut generation = 0;
        self.inner.published.send_modify(|s| {
            s.retries_count += 1;
            generation = s.generation;
        });
        match handle {
            Some(handle) => Ok(self.inner.run(&handle)),
            None => {
                debug!(generation, "retry ignored while will_run is off");
                Ok(generation)
            }
        }
    }

    /// Turning `will_run` on issues a request; turning it off stops future
    /// runs and, when cancelable, aborts the current one.
    pub fn set_will_run(&self, will_run: bool) -> Result<()> {
        let handle = if will_run && !self.inner.will_run() {
            Some(runtime::current_handle("data_request")?)
        } else {
            None
        };
        let was = {
            let mut flag = self.inner.will_run.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *flag, will_run)
        };
        match (was, will_run, handle) {
            (false, true, Some(handle)) => {
                self.inner.run(&handle);
            }
            (true, false, _) if self.inner.cancelable => self.cancel(),
            _ => {}
        }
        Ok(())
    }

    /// Abort the current run, if any. Its result, success or failure, is never published.
    pub fn cancel(&self) {
        if let Some(token) = self.inner.replace_token(None) {
            token.cancel();
            self.inner.published.send_if_modified(|s| {
                if !s.loading {
                    return false;
                }
                // Nothing supersedes this run, so release `loading` here.
                s.loading = false;
                s.generation += 1;
                true
            });
        }
    }

    /// Replace the data locally without issuing a request.
    pub fn set_data(&self, data: Value) {
        self.inner.published.send_modify(|s| s.data = Some(data));
    }

    pub fn data(&self) -> Option<Value> {
        self.inner.published.borrow().data.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.published.borrow().loading
    }

    pub fn snapshot(&self) -> DataSnapshot {
        self.inner.published.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DataSnapshot> {
        self.inner.published.subscribe()
    }

    /// Wait until no run is loading.
    pub async fn settled(&self) -> Result<DataSnapshot> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| !s.loading)
            .await
            .map_err(|_| {
                Error::runtime_with_context(
                    "data state channel closed",
                    ErrorContext::new().with_source("data_request"),
                )
            })?
            .clone();
        Ok(snapshot)
    }
}

pub struct DataRequestBuilder {
    request: RequestDescriptor,
    options: DataRequestOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl DataRequestBuilder {
    pub fn new(request: RequestDescriptor) -> Self {
        Self {
            request,
            options: DataRequestOptions::default(),
            transport: None,
        }
    }

    pub fn options(mut self, options: DataRequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn will_run(mut self, will_run: bool) -> Self {
        self.options.will_run = will_run;
        self
    }

    pub fn cancelable(mut self, cancelable: bool) -> Self {
        self.options.cancelable = cancelable;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build and, when `will_run` is set, issue the first request.
    pub fn start(self) -> Result<DataRequest> {
        let handle = if self.options.will_run {
            Some(runtime::current_handle("data_request")?)
        } else {
            None
        };
        let transport = match self.transport {
            Some(t) => t,
            None => transport::default_transport()?,
        };
        let (published, _) = watch::channel(DataSnapshot {
            loading: self.options.will_run,
            generation: 0,
            retries_count: 0,
            data: None,
            response: None,
            error: None,
        });
        let inner = Arc::new(DataInner {
            request: self.request,
            transport,
            cancelable: self.options.cancelable,
            will_run: Mutex::new(self.options.will_run),
            current: Mutex::new(None),
            published,
        });
        if let Some(handle) = handle {
            inner.run(&handle);
        }
        Ok(DataRequest { inner })
    }
}

/// GET request for `request`, whatever method it carried.
pub fn get_data(request: impl IntoRequest) -> Result<DataRequestBuilder> {
    let request = request.into_request()?.merge(&RequestDescriptor::with_method_only(Method::Get));
    Ok(DataRequestBuilder::new(request))
}
