//! 批量请求模块：并发发出一组独立请求，并按输入顺序划分成功与失败结果。
//!
//! # Batch Orchestration Module
//!
//! Issues one request per input, all at once, and partitions the outcomes into
//! `succeeded`/`failed` sets that keep the original input order. Failed inputs
//! can be re-issued selectively through a retry handle derived from the latest
//! settled generation.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchOrchestrator`] | Runs generations and publishes their snapshots |
//! | [`BatchState`] | Mutable aggregate with explicit transitions |
//! | [`BatchSnapshot`] | Read-only view of one generation |
//! | [`RetryCoordinator`] / [`RetryHandle`] | Selective retry over the failed set |
//! | [`BatchListener`] | Callback invoked once per settled generation |
//!
//! ## Example
//!
//! ```rust,no_run
//! use parallel_requests::batch::parallel_get;
//!
//! # async fn run() -> parallel_requests::Result<()> {
//! let users = parallel_get(|id: &u64| format!("https://api.example.com/users/{}", id))?;
//! users.exec(vec![1, 2, 3])?;
//!
//! let snapshot = users.settled().await?;
//! println!("{} ok, {} failed", snapshot.success_count(), snapshot.failure_count());
//!
//! if let Some(retry) = users.retry() {
//!     retry.invoke()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Generations
//!
//! Every `exec` (retries included) opens a new generation. Observers see
//! exactly two snapshots per generation: the in-flight one published by
//! `exec` itself and the settled one. Results of a superseded generation are
//! dropped on arrival and never published.

mod listener;
mod orchestrator;
mod retry;
mod state;

pub use listener::{BatchListener, FnListener, InMemoryListener};
pub use orchestrator::{BatchOrchestrator, BatchOrchestratorBuilder, Observation};
pub use retry::{RetryCoordinator, RetryHandle};
pub use state::{BatchSnapshot, BatchState, Recorded};

use crate::request::{IntoRequest, Method};
use crate::Result;

fn with_method<I, F, R>(method: Method, factory: F) -> Result<BatchOrchestrator<I>>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    BatchOrchestrator::builder().method(method).build(factory)
}

/// Batch of GET requests over the default transport.
pub fn parallel_get<I, F, R>(factory: F) -> Result<BatchOrchestrator<I>>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    with_method(Method::Get, factory)
}

/// Batch of POST requests over the default transport.
pub fn parallel_post<I, F, R>(factory: F) -> Result<BatchOrchestrator<I>>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    with_method(Method::Post, factory)
}

/// Batch of PUT requests over the default transport.
pub fn parallel_put<I, F, R>(factory: F) -> Result<BatchOrchestrator<I>>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    with_method(Method::Put, factory)
}

/// Batch of PATCH requests over the default transport.
pub fn parallel_patch<I, F, R>(factory: F) -> Result<BatchOrchestrator<I>>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    with_method(Method::Patch, factory)
}

/// Batch of DELETE requests over the default transport.
pub fn parallel_delete<I, F, R>(factory: F) -> Result<BatchOrchestrator<I>>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    with_method(Method::Delete, factory)
}
