//! Compensation log for the order creation saga.
//!
//! Every step that writes something records how to undo it. When a later
//! step fails, the coordinator walks the log backwards and runs each undo
//! once; undo failures are recorded, never raised.

use common::OrderId;
use serde::Serialize;

/// Lifecycle of one saga run.
///
/// ```text
/// Running ──┬──► Completed
///           └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    #[default]
    Running,
    Compensating,
    Completed,
    Failed,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }
}

/// A committed write that can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CompensableStep {
    /// Undone by deleting the order header.
    OrderInserted { order_id: OrderId },
    /// Undone by deleting the order's lines.
    ItemsInserted { order_id: OrderId },
}

impl CompensableStep {
    pub fn name(&self) -> &'static str {
        match self {
            CompensableStep::OrderInserted { .. } => "insert_order",
            CompensableStep::ItemsInserted { .. } => "insert_items",
        }
    }
}

/// What happened when one step was undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationOutcome {
    pub step: &'static str,
    pub error: Option<String>,
}

/// Steps taken so far in one saga run, and how their undo went.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SagaLog {
    state: SagaState,
    completed: Vec<CompensableStep>,
    failed_step: Option<&'static str>,
    failure_reason: Option<String>,
    compensations: Vec<CompensationOutcome>,
}

impl SagaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Records a committed step.
    pub fn record(&mut self, step: CompensableStep) {
        self.completed.push(step);
    }

    /// Marks the run as failed at `step` and returns the undo list, newest first.
    pub fn fail(&mut self, step: &'static str, reason: impl Into<String>) -> Vec<CompensableStep> {
        self.state = SagaState::Compensating;
        self.failed_step = Some(step);
        self.failure_reason = Some(reason.into());
        self.completed.iter().rev().copied().collect()
    }

    /// Records the outcome of one undo.
    pub fn compensated(&mut self, step: CompensableStep, error: Option<String>) {
        self.compensations.push(CompensationOutcome {
            step: step.name(),
            error,
        });
    }

    /// Closes the run.
    pub fn finish(&mut self) {
        self.state = match self.state {
            SagaState::Compensating => SagaState::Failed,
            _ => SagaState::Completed,
        };
    }

    pub fn completed_steps(&self) -> &[CompensableStep] {
        &self.completed
    }

    pub fn failed_step(&self) -> Option<&'static str> {
        self.failed_step
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn compensations(&self) -> &[CompensationOutcome] {
        &self.compensations
    }

    /// Returns true if any undo failed and rows may have been left behind.
    pub fn has_orphans(&self) -> bool {
        self.compensations.iter().any(|c| c.error.is_some())
    }
}
