//! Batch execution state and its transitions.
//!
//! Outcomes are buffered per input position while a generation is running and
//! only turned into the published partitions by [`BatchState::finalize`], so
//! completion order never leaks into `succeeded`/`failed`.

use crate::transport::{Response, TransportError};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum Outcome {
    Success(Response),
    Failure(Arc<TransportError>),
}

/// What a `record_*` call did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Belongs to a superseded generation, or the slot was already settled.
    Ignored,
    /// Stored; other requests of the generation are still outstanding.
    Pending { settled: usize, total: usize },
    /// Stored, and it was the last outstanding request. Call `finalize`.
    Complete,
}

/// Consolidated, read-only view of one generation.
#[derive(Debug, Clone)]
pub struct BatchSnapshot<I> {
    pub in_flight: bool,
    /// Execution sequence number; 0 before the first `exec`.
    pub generation: u64,
    pub inputs: Vec<I>,
    pub succeeded: Vec<I>,
    pub failed: Vec<I>,
    pub responses: Vec<Response>,
    pub data: Vec<Value>,
    pub errors: Vec<Arc<TransportError>>,
    pub execution_time: Duration,
}

impl<I> BatchSnapshot<I> {
    pub fn is_settled(&self) -> bool {
        !self.in_flight
    }

    pub fn all_succeeded(&self) -> bool {
        self.is_settled() && self.failed.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.inputs.is_empty() {
            0.0
        } else {
            self.succeeded.len() as f64 / self.inputs.len() as f64
        }
    }
}

/// The single mutable aggregate behind an orchestrator.
#[derive(Debug)]
pub struct BatchState<I> {
    in_flight: bool,
    generation: u64,
    inputs: Vec<I>,
    outcomes: Vec<Option<Outcome>>,
    settled: usize,
    started_at: Option<Instant>,
    succeeded: Vec<I>,
    failed: Vec<I>,
    responses: Vec<Response>,
    data: Vec<Value>,
    errors: Vec<Arc<TransportError>>,
    execution_time: Duration,
}

impl<I: Clone> BatchState<I> {
    pub fn new() -> Self {
        Self {
            in_flight: false,
            generation: 0,
            inputs: Vec::new(),
            outcomes: Vec::new(),
            settled: 0,
            started_at: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
            responses: Vec::new(),
            data: Vec::new(),
            errors: Vec::new(),
            execution_time: Duration::ZERO,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn failed(&self) -> &[I] {
        &self.failed
    }

    /// Open a new generation over `inputs`, discarding everything from the previous one.
    ///
    /// Returns the new generation number.
    pub fn start_execution(&mut self, inputs: Vec<I>) -> u64 {
        self.generation += 1;
        self.in_flight = true;
        self.outcomes = (0..inputs.len()).map(|_| None).collect();
        self.inputs = inputs;
        self.settled = 0;
        self.started_at = Some(Instant::now());
        self.succeeded.clear();
        self.failed.clear();
        self.responses.clear();
        self.data.clear();
        self.errors.clear();
        self.execution_time = Duration::ZERO;
        self.generation
    }

    /// True once every request of the current generation has an outcome.
    pub fn is_complete(&self) -> bool {
        self.in_flight && self.settled == self.outcomes.len()
    }

    pub fn record_success(&mut self, generation: u64, index: usize, response: Response) -> Recorded {
        self.record(generation, index, Outcome::Success(response))
    }

    pub fn record_failure(&mut self, generation: u64, index: usize, error: TransportError) -> Recorded {
        self.record(generation, index, Outcome::Failure(Arc::new(error)))
    }

    fn record(&mut self, generation: u64, index: usize, outcome: Outcome) -> Recorded {
        if generation != self.generation || !self.in_flight {
            return Recorded::Ignored;
        }
        let slot = match self.outcomes.get_mut(index) {
            Some(slot) if slot.is_none() => slot,
            _ => return Recorded::Ignored,
        };
        *slot = Some(outcome);
        self.settled += 1;
        if self.settled == self.outcomes.len() {
            Recorded::Complete
        } else {
            Recorded::Pending {
                settled: self.settled,
                total: self.outcomes.len(),
            }
        }
    }

    /// Assemble the positional partitions and leave the in-flight state.
    ///
    /// A no-op returning the current snapshot when outcomes are still missing.
    pub fn finalize(&mut self) -> BatchSnapshot<I> {
        if !self.is_complete() {
            return self.snapshot();
        }

        for (input, outcome) in self.inputs.iter().zip(self.outcomes.drain(..)) {
            match outcome {
                Some(Outcome::Success(resp)) => {
                    self.succeeded.push(input.clone());
                    self.data.push(resp.body.clone());
                    self.responses.push(resp);
                }
                Some(Outcome::Failure(err)) => {
                    self.failed.push(input.clone());
                    self.errors.push(err);
                }
                None => {}
            }
        }

        self.in_flight = false;
        self.execution_time = self
            .started_at
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.snapshot()
    }

    pub fn snapshot(&self) -> BatchSnapshot<I> {
        BatchSnapshot {
            in_flight: self.in_flight,
            generation: self.generation,
            inputs: self.inputs.clone(),
            succeeded: self.succeeded.clone(),
            failed: self.failed.clone(),
            responses: self.responses.clone(),
            data: self.data.clone(),
            errors: self.errors.clone(),
            execution_time: self.execution_time,
        }
    }
}

impl<I: Clone> Default for BatchState<I> {
    fn default() -> Self {
        Self::new()
    }
}
