//! Selective retry derived from a batch's failed set.

use super::orchestrator::BatchOrchestrator;
use super::state::BatchSnapshot;
use crate::Result;
use std::fmt;
use tracing::info;

/// Zero-argument capability that re-runs exactly the inputs it captured.
///
/// The captured set is frozen at derivation time: a handle obtained before a
/// later `exec` still retries what had failed when it was derived.
pub struct RetryHandle<I> {
    orchestrator: BatchOrchestrator<I>,
    inputs: Vec<I>,
}

impl<I> RetryHandle<I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Inputs this handle will re-issue.
    pub fn inputs(&self) -> &[I] {
        &self.inputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Start a new generation over the captured inputs, reusing the
    /// orchestrator's factory, overrides and transport.
    pub fn invoke(&self) -> Result<u64> {
        info!(count = self.inputs.len(), "retrying failed requests");
        self.orchestrator.exec(self.inputs.clone())
    }
}

impl<I> Clone for RetryHandle<I>
where
    I: Clone,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            inputs: self.inputs.clone(),
        }
    }
}

impl<I: fmt::Debug> fmt::Debug for RetryHandle<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandle")
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Stateless: everything it knows comes from the failed set it is handed.
pub struct RetryCoordinator;

impl RetryCoordinator {
    /// `None` when `failed` is empty, otherwise a handle bound to `orchestrator`.
    pub fn derive<I>(orchestrator: &BatchOrchestrator<I>, failed: &[I]) -> Option<RetryHandle<I>>
    where
        I: Clone + Send + Sync + 'static,
    {
        if failed.is_empty() {
            return None;
        }
        Some(RetryHandle {
            orchestrator: orchestrator.clone(),
            inputs: failed.to_vec(),
        })
    }

    /// Wait for the current generation, then keep retrying its failures for at
    /// most `max_rounds` further generations. Returns the last settled snapshot.
    ///
    /// Rounds follow each other immediately; there is no delay between them.
    pub async fn converge<I>(
        orchestrator: &BatchOrchestrator<I>,
        max_rounds: usize,
    ) -> Result<BatchSnapshot<I>>
    where
        I: Clone + Send + Sync + 'static,
    {
        let mut snapshot = orchestrator.settled().await?;
        for round in 1..=max_rounds {
            let handle = match Self::derive(orchestrator, &snapshot.failed) {
                Some(h) => h,
                None => break,
            };
            info!(round, remaining = handle.len(), "retry round");
            handle.invoke()?;
            snapshot = orchestrator.settled().await?;
        }
        Ok(snapshot)
    }
}
