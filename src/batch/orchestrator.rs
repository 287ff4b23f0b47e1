//! Batch orchestrator: one concurrent request per input, partitioned outcomes.

use super::listener::BatchListener;
use super::retry::{RetryCoordinator, RetryHandle};
use super::state::{BatchSnapshot, BatchState, Recorded};
use crate::request::{self, IntoRequest, Method, RequestDescriptor, RequestFactory};
use crate::runtime;
use crate::transport::{self, Transport};
use crate::{Error, ErrorContext, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

/// Host-facing view: the latest snapshot plus the retry capability derived from it.
pub struct Observation<I> {
    pub snapshot: BatchSnapshot<I>,
    /// Present iff `snapshot.failed` is non-empty.
    pub retry: Option<RetryHandle<I>>,
}

struct Inner<I> {
    factory: RequestFactory<I>,
    overrides: RequestDescriptor,
    transport: Arc<dyn Transport>,
    state: Mutex<BatchState<I>>,
    published: watch::Sender<BatchSnapshot<I>>,
    listeners: RwLock<Vec<Arc<dyn BatchListener<I>>>>,
    /// Settled snapshots awaiting listener delivery, queued in generation order.
    notices: Mutex<VecDeque<BatchSnapshot<I>>>,
    dispatching: tokio::sync::Mutex<()>,
}

impl<I> Inner<I>
where
    I: Clone + Send + Sync + 'static,
{
    // Critical sections never panic midway, so a poisoned lock still holds consistent state.
    fn lock_state(&self) -> MutexGuard<'_, BatchState<I>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> Vec<Arc<dyn BatchListener<I>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // Called with the state lock held so the queue follows generation order.
    fn queue_notice(&self, snapshot: &BatchSnapshot<I>) -> bool {
        if self.listeners().is_empty() {
            return false;
        }
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(snapshot.clone());
        true
    }

    /// Deliver queued snapshots one at a time. Whoever holds `dispatching`
    /// drains the queue, so listeners never see generations out of order.
    async fn dispatch_notices(&self) {
        let _turn = self.dispatching.lock().await;
        loop {
            let next = self
                .notices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let snapshot = match next {
                Some(snapshot) => snapshot,
                None => break,
            };
            for listener in self.listeners() {
                listener.on_settled(&snapshot).await;
            }
        }
    }

    async fn run_generation(self: Arc<Self>, generation: u64, requests: Vec<RequestDescriptor>) {
        // FuturesUnordered polls newly pushed futures in insertion order, so requests
        // are issued in input order; they then settle in whatever order the transport finishes.
        let mut pending: FuturesUnordered<_> = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                let transport = Arc::clone(&self.transport);
                async move { (index, transport::send_caught(transport.as_ref(), request).await) }
            })
            .collect();

        while let Some((index, result)) = pending.next().await {
            let settled = {
                let mut state = self.lock_state();
                let recorded = match result {
                    Ok(response) => state.record_success(generation, index, response),
                    Err(err) => {
                        debug!(generation, index, error = %err, "request failed");
                        state.record_failure(generation, index, err)
                    }
                };
                match recorded {
                    Recorded::Ignored => {
                        debug!(
                            generation,
                            current = state.generation(),
                            index,
                            "dropping result of superseded generation"
                        );
                        None
                    }
                    Recorded::Pending { settled, total } => {
                        debug!(generation, index, settled, total, "request settled");
                        None
                    }
                    Recorded::Complete => {
                        let snapshot = state.finalize();
                        self.published.send_replace(snapshot.clone());
                        let queued = self.queue_notice(&snapshot);
                        Some((snapshot, queued))
                    }
                }
            };

            if let Some((snapshot, queued)) = settled {
                info!(
                    generation,
                    succeeded = snapshot.success_count(),
                    failed = snapshot.failure_count(),
                    elapsed_ms = snapshot.execution_time.as_millis() as u64,
                    "batch settled"
                );
                if queued {
                    self.dispatch_notices().await;
                }
            }
        }
    }
}

/// Issues one request per input, concurrently, and partitions the outcomes.
///
/// Cloning is cheap and every clone drives the same state. `exec` needs a
/// Tokio runtime and returns a `Runtime` error outside one. Listeners are
/// told about settled generations in generation order.
pub struct BatchOrchestrator<I> {
    inner: Arc<Inner<I>>,
}

impl<I> Clone for BatchOrchestrator<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> BatchOrchestrator<I>
where
    I: Clone + Send + Sync + 'static,
{
    pub fn builder() -> BatchOrchestratorBuilder<I> {
        BatchOrchestratorBuilder::new()
    }

    /// The overrides laid over every factory descriptor.
    pub fn overrides(&self) -> &RequestDescriptor {
        &self.inner.overrides
    }

    /// Start a new generation over `inputs` and return its sequence number.
    ///
    /// Descriptors for every input are built before anything else happens; if
    /// any of them fails the error is returned and the state is left untouched.
    /// Otherwise the state flips to in-flight with cleared results before this
    /// returns, and the requests run on a spawned task. Results of any
    /// generation still running are discarded when they arrive.
    pub fn exec(&self, inputs: Vec<I>) -> Result<u64> {
        let requests = inputs
            .iter()
            .map(|input| Ok((self.inner.factory)(input)?.merge(&self.inner.overrides)))
            .collect::<Result<Vec<_>>>()?;
        let handle = runtime::current_handle("batch_orchestrator")?;
        let size = requests.len();

        let (generation, empty_settled) = {
            let mut state = self.inner.lock_state();
            let generation = state.start_execution(inputs);
            let snapshot = if state.is_complete() {
                Some(state.finalize())
            } else {
                None
            };
            // Publish under the lock so observers see generations in order.
            self.inner
                .published
                .send_replace(snapshot.clone().unwrap_or_else(|| state.snapshot()));
            let queued = snapshot
                .as_ref()
                .map_or(false, |s| self.inner.queue_notice(s));
            (generation, snapshot.map(|_| queued))
        };

        info!(generation, size, "batch started");

        let inner = Arc::clone(&self.inner);
        match empty_settled {
            Some(queued) => {
                info!(generation, "empty batch settled");
                if queued {
                    handle.spawn(async move { inner.dispatch_notices().await });
                }
            }
            None => {
                handle.spawn(inner.run_generation(generation, requests));
            }
        }

        Ok(generation)
    }

    /// Current state, which is either the pending view or the settled result of the latest generation.
    pub fn snapshot(&self) -> BatchSnapshot<I> {
        self.inner.published.borrow().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.published.borrow().in_flight
    }

    /// Snapshot plus the retry capability derived from its failed set.
    pub fn observe(&self) -> Observation<I> {
        let snapshot = self.snapshot();
        let retry = RetryCoordinator::derive(self, &snapshot.failed);
        Observation { snapshot, retry }
    }

    /// Shorthand for `observe().retry`.
    pub fn retry(&self) -> Option<RetryHandle<I>> {
        self.observe().retry
    }

    /// Receiver of every published snapshot: one when a generation starts and one when it settles.
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot<I>> {
        self.inner.published.subscribe()
    }

    /// Wait until the latest generation has settled and return its snapshot.
    pub async fn settled(&self) -> Result<BatchSnapshot<I>> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| !s.in_flight)
            .await
            .map_err(|_| {
                Error::runtime_with_context(
                    "batch state channel closed",
                    ErrorContext::new().with_source("batch_orchestrator"),
                )
            })?
            .clone();
        Ok(snapshot)
    }

    pub fn add_listener(&self, listener: Arc<dyn BatchListener<I>>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

/// Builder for [`BatchOrchestrator`].
pub struct BatchOrchestratorBuilder<I> {
    transport: Option<Arc<dyn Transport>>,
    overrides: RequestDescriptor,
    listeners: Vec<Arc<dyn BatchListener<I>>>,
}

impl<I> BatchOrchestratorBuilder<I>
where
    I: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            transport: None,
            overrides: RequestDescriptor::new(),
            listeners: Vec::new(),
        }
    }

    /// Use this transport instead of the process-wide default.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn overrides(mut self, overrides: RequestDescriptor) -> Self {
        self.overrides = overrides;
        self
    }

    /// Fix the method of every request.
    pub fn method(mut self, method: Method) -> Self {
        self.overrides.method = Some(method);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn BatchListener<I>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build with a closure returning anything [`IntoRequest`].
    pub fn build<F, R>(self, factory: F) -> Result<BatchOrchestrator<I>>
    where
        F: Fn(&I) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        self.build_with_factory(request::factory(factory))
    }

    pub fn build_with_factory(self, factory: RequestFactory<I>) -> Result<BatchOrchestrator<I>> {
        let transport = match self.transport {
            Some(t) => t,
            None => transport::default_transport()?,
        };
        let (published, _) = watch::channel(BatchState::new().snapshot());

        Ok(BatchOrchestrator {
            inner: Arc::new(Inner {
                factory,
                overrides: self.overrides,
                transport,
                state: Mutex::new(BatchState::new()),
                published,
                notices: Mutex::new(VecDeque::new()),
                dispatching: tokio::sync::Mutex::new(()),
                listeners: RwLock::new(self.listeners),
            }),
        })
    }
}

impl<I> Default for BatchOrchestratorBuilder<I>
where
    I: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
