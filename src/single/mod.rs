//! 单请求模块：按需执行的请求回调与构造即加载的数据请求。
//!
//! Single-request siblings of the batch orchestrator.
//!
//! - [`RequestCallback`] sends nothing until `exec(input)` is called, remembers
//!   the input, and can re-send it with `retry`.
//! - [`DataRequest`] sends its fixed request as soon as it is built, tracks
//!   `retries_count`, and can cancel a superseded run through a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! Both publish their state through a `tokio::sync::watch` channel and drop
//! results of runs that have been superseded.

mod callback;
mod data;

pub use callback::{
    delete_callback, get_callback, patch_callback, post_callback, put_callback, CallbackSnapshot,
    RequestCallback, RequestCallbackBuilder,
};
pub use data::{get_data, DataRequest, DataRequestBuilder, DataRequestOptions, DataSnapshot};
