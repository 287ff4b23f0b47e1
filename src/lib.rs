//! # parallel-requests
//!
//! 并发批量请求编排库：一次发出多个独立请求，分别记录成功与失败，并只重试失败的部分。
//!
//! Batch request orchestration with selective retry.
//!
//! ## Overview
//!
//! Given a list of inputs and a factory that turns each input into a request
//! descriptor, a [`BatchOrchestrator`] issues every request at once, waits for
//! all of them independently, and publishes the outcome partitioned into
//! `succeeded` and `failed` sets that keep the original input order. A
//! [`RetryHandle`] derived from the failed set re-runs exactly those inputs
//! with the same request-construction policy.
//!
//! ## Key Features
//!
//! - **No fail-fast**: one failing request never aborts its siblings
//! - **Positional results**: partitions follow input order, not completion order
//! - **Generations**: results of a superseded `exec` are never published
//! - **Injected transport**: any [`Transport`] implementation, with a
//!   process-wide default backed by `reqwest`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parallel_requests::{BatchOrchestrator, RequestDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> parallel_requests::Result<()> {
//!     let batch = BatchOrchestrator::builder()
//!         .build(|id: &u32| RequestDescriptor::new().url(format!("https://api.example.com/items/{}", id)))?;
//!
//!     batch.exec(vec![1, 2, 3])?;
//!     let snapshot = batch.settled().await?;
//!
//!     for (id, body) in snapshot.succeeded.iter().zip(&snapshot.data) {
//!         println!("{}: {}", id, body);
//!     }
//!     if let Some(retry) = batch.retry() {
//!         retry.invoke()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Batch orchestrator, snapshots, listeners and selective retry |
//! | [`single`] | Single-request callback and load-on-construction data request |
//! | [`request`] | Request descriptors, factories and templates |
//! | [`transport`] | Transport trait, HTTP implementation and the default slot |
//! | [`config`] | HTTP client configuration from code, env or YAML |

pub mod batch;
pub mod config;
pub mod error;
pub mod request;
mod runtime;
pub mod single;
pub mod transport;

pub use batch::{
    parallel_delete, parallel_get, parallel_patch, parallel_post, parallel_put, BatchListener,
    BatchOrchestrator, BatchSnapshot, Observation, RetryCoordinator, RetryHandle,
};
pub use config::ClientConfig;
pub use error::{Error, ErrorContext};
pub use request::{IntoRequest, Method, RequestDescriptor, RequestTemplate};
pub use single::{DataRequest, DataRequestOptions, RequestCallback};
pub use transport::{
    default_transport, provide_transport, reset_transport, HttpTransport, Response, Transport,
    TransportError,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
