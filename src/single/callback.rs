//! On-demand single request: nothing is sent until `exec` is called.

use crate::request::{Method, RequestDescriptor, RequestTemplate};
use crate::runtime;
use crate::transport::{self, Response, Transport, TransportError};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Published state of a [`RequestCallback`].
#[derive(Debug, Clone)]
pub struct CallbackSnapshot<I> {
    pub in_flight: bool,
    /// Number of `exec` calls so far, retries included.
    pub exec_count: u64,
    /// Input of the most recent `exec`.
    pub input: Option<I>,
    pub response: Option<Response>,
    pub data: Option<Value>,
    pub error: Option<Arc<TransportError>>,
}

impl<I> CallbackSnapshot<I> {
    fn initial() -> Self {
        Self {
            in_flight: false,
            exec_count: 0,
            input: None,
            response: None,
            data: None,
            error: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.in_flight
    }
}

struct CallbackInner<I> {
    template: RequestTemplate<I>,
    overrides: RequestDescriptor,
    transport: Arc<dyn Transport>,
    published: watch::Sender<CallbackSnapshot<I>>,
}

/// Single request issued on demand, with the input of each call recorded for `retry`.
pub struct RequestCallback<I> {
    inner: Arc<CallbackInner<I>>,
}

impl<I> Clone for RequestCallback<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> RequestCallback<I>
where
    I: Clone + Send + Sync + 'static,
{
    pub fn builder(template: RequestTemplate<I>) -> RequestCallbackBuilder<I> {
        RequestCallbackBuilder::new(template)
    }

    /// Issue the request for `input`. Returns the new exec count.
    ///
    /// The previous response and data stay visible until this call settles;
    /// the previous error is cleared immediately. Outside a Tokio runtime
    /// this is a `Runtime` error and nothing changes.
    pub fn exec(&self, input: I) -> Result<u64> {
        let request = self.inner.template.resolve(&input, &self.inner.overrides)?;
        let handle = runtime::current_handle("request_callback")?;

        let mut exec_count = 0;
        self.inner.published.send_modify(|s| {
            s.exec_count += 1;
            s.in_flight = true;
            s.error = None;
            s.input = Some(input);
            exec_count = s.exec_count;
        });
        debug!(exec_count, method = %request.effective_method(), "request callback started");

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let result = transport::send_caught(inner.transport.as_ref(), request).await;
            let published = inner.published.send_if_modified(|s| {
                if s.exec_count != exec_count {
                    return false;
                }
                s.in_flight = false;
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
                info!(exec_count, "request callback settled");
            } else {
                debug!(exec_count, "dropping result of superseded call");
            }
        });

        Ok(exec_count)
    }

    /// Re-issue the request for the last input.
    pub fn retry(&self) -> Result<u64> {
        let input = self.inner.published.borrow().input.clone();
        match input {
            Some(input) => self.exec(input),
            None => Err(Error::validation_with_context(
                "retry called before the first exec",
                ErrorContext::new().with_source("request_callback"),
            )),
        }
    }

    pub fn snapshot(&self) -> CallbackSnapshot<I> {
        self.inner.published.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallbackSnapshot<I>> {
        self.inner.published.subscribe()
    }

    /// Wait until the latest call has settled.
    pub async fn settled(&self) -> Result<CallbackSnapshot<I>> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| !s.in_flight)
            .await
            .map_err(|_| {
                Error::runtime_with_context(
                    "request state channel closed",
                    ErrorContext::new().with_source("request_callback"),
                )
            })?
            .clone();
        Ok(snapshot)
    }
}

pub struct RequestCallbackBuilder<I> {
    template: RequestTemplate<I>,
    overrides: RequestDescriptor,
    transport: Option<Arc<dyn Transport>>,
}

impl<I> RequestCallbackBuilder<I>
where
    I: Clone + Send + Sync + 'static,
{
    pub fn new(template: RequestTemplate<I>) -> Self {
        Self {
            template,
            overrides: RequestDescriptor::new(),
            transport: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn overrides(mut self, overrides: RequestDescriptor) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.overrides.method = Some(method);
        self
    }

    pub fn build(self) -> Result<RequestCallback<I>> {
        let transport = match self.transport {
            Some(t) => t,
            None => transport::default_transport()?,
        };
        let (published, _) = watch::channel(CallbackSnapshot::initial());
        Ok(RequestCallback {
            inner: Arc::new(CallbackInner {
                template: self.template,
                overrides: self.overrides,
                transport,
                published,
            }),
        })
    }
}

fn with_method<I>(method: Method, template: RequestTemplate<I>) -> Result<RequestCallback<I>>
where
    I: Clone + Send + Sync + 'static,
{
    RequestCallback::builder(template).method(method).build()
}

pub fn get_callback<I>(template: RequestTemplate<I>) -> Result<RequestCallback<I>>
where
    I: Clone + Send + Sync + 'static,
{
    with_method(Method::Get, template)
}

pub fn post_callback<I>(template: RequestTemplate<I>) -> Result<RequestCallback<I>>
where
    I: Clone + Send + Sync + 'static,
{
    with_method(Method::Post, template)
}

pub fn put_callback<I>(template: RequestTemplate<I>) -> Result<RequestCallback<I>>
where
    I: Clone + Send + Sync + 'static,
{
    with_method(Method::Put, template)
}

pub fn patch_callback<I>(template: RequestTemplate<I>) -> Result<RequestCallback<I>>
where
    I: Clone + Send + Sync + 'static,
{
    with_method(Method::Patch, template)
}

pub fn delete_callback<I>(template: RequestTemplate<I>) -> Result<RequestCallback<I>>
where
    I: Clone + Send + Sync + 'static,
{
    with_method(Method::Delete, template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::from_fn;
    use serde_json::json;
    use std::time::Duration;

    fn echo() -> Arc<dyn Transport> {
        from_fn(|req: RequestDescriptor| async move {
            let url = req.url.unwrap_or_default();
            if url.ends_with("/0") {
                Err(TransportError::Status {
                    status: 404,
                    body: "missing".into(),
                })
            } else {
                Ok(Response::new(json!({ "url": url, "method": req.method })))
            }
        })
    }

    fn users(transport: Arc<dyn Transport>) -> RequestCallback<u32> {
        RequestCallback::builder(RequestTemplate::from_fn(|id: &u32| format!("/users/{}", id)))
            .transport(transport)
            .method(Method::Post)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exec_publishes_data() {
        let cb = users(echo());
        assert_eq!(cb.exec(7).unwrap(), 1);
        assert!(cb.snapshot().in_flight);

        let snap = cb.settled().await.unwrap();
        assert_eq!(snap.input, Some(7));
        assert_eq!(snap.data, Some(json!({"url": "/users/7", "method": "POST"})));
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_data() {
        let cb = users(echo());
        cb.exec(1).unwrap();
        cb.settled().await.unwrap();

        cb.exec(0).unwrap();
        let snap = cb.settled().await.unwrap();
        assert_eq!(snap.error.as_ref().and_then(|e| e.status()), Some(404));
        assert_eq!(snap.data, Some(json!({"url": "/users/1", "method": "POST"})));
    }

    #[tokio::test]
    async fn test_retry_before_exec_is_an_error() {
        let cb = users(echo());
        assert!(matches!(cb.retry(), Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_retry_reuses_last_input() {
        let cb = users(echo());
        cb.exec(0).unwrap();
        cb.settled().await.unwrap();

        assert_eq!(cb.retry().unwrap(), 2);
        let snap = cb.settled().await.unwrap();
        assert_eq!(snap.input, Some(0));
        assert_eq!(snap.exec_count, 2);
        assert!(snap.error.is_some());
    }

    #[tokio::test]
    async fn test_superseded_call_never_publishes() {
        let transport = from_fn(|req: RequestDescriptor| async move {
            let slow = req.url.as_deref() == Some("/users/1");
            if slow {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok::<_, TransportError>(Response::new(json!(req.url)))
        });
        let cb = users(transport);
        cb.exec(1).unwrap();
        cb.exec(2).unwrap();

        let snap = cb.settled().await.unwrap();
        assert_eq!(snap.data, Some(json!("/users/2")));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cb.snapshot().data, Some(json!("/users/2")));
    }

    #[test]
    fn test_exec_outside_runtime_changes_nothing() {
        let cb = users(echo());
        assert!(matches!(cb.exec(7), Err(Error::Runtime { .. })));
        let snap = cb.snapshot();
        assert_eq!(snap.exec_count, 0);
        assert!(!snap.in_flight);
        assert!(snap.input.is_none());
    }

    #[tokio::test]
    async fn test_panicking_transport_settles_with_error() {
        let cb = users(from_fn(|_req: RequestDescriptor| async move {
            if true {
                panic!("handler crashed");
            }
            Ok::<_, TransportError>(Response::new(json!(null)))
        }));
        cb.exec(3).unwrap();
        let snap = tokio::time::timeout(Duration::from_secs(2), cb.settled())
            .await
            .expect("call settles")
            .unwrap();
        assert!(!snap.in_flight);
        assert!(matches!(snap.error.as_deref(), Some(TransportError::Other(msg)) if msg.contains("handler crashed")));
    }
}
