//! Access to the Tokio runtime that drives spawned requests.

use crate::{Error, ErrorContext, Result};
use tokio::runtime::Handle;

/// Handle of the ambient runtime. Outside one this is a `Runtime` error
/// raised by `source`, returned before any state changes.
pub(crate) fn current_handle(source: &str) -> Result<Handle> {
    Handle::try_current().map_err(|e| {
        Error::runtime_with_context(
            "no tokio runtime",
            ErrorContext::new().with_source(source).with_details(e.to_string()),
        )
    })
}
