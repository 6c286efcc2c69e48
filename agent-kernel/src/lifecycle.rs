//! Task state machine driven by the dispatch loop.

use agent_primitives::SessionId;
use thiserror::Error;
use tracing::debug;

/// States a session passes through while working on one user task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No task has started since the session was created or reset.
    Idle,
    /// Waiting for the model's next turn.
    AwaitingModel,
    /// The model asked for one or more tool calls.
    HasToolRequests,
    /// Requested tools are running.
    Executing,
    /// The model produced its final answer.
    HasFinalAnswer,
    /// The step budget ran out before a final answer.
    StepBudgetExceeded,
    /// The task stopped on an error.
    Aborted,
}

impl TaskState {
    /// Returns `true` once the task can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::HasFinalAnswer | Self::StepBudgetExceeded | Self::Aborted
        )
    }
}

/// Events that trigger task transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// A new user task starts.
    Begin,
    /// The model turn carried tool calls.
    ToolRequests,
    /// Tool execution starts.
    Execute,
    /// Tool results were appended; ask the model again.
    Continue,
    /// The model answered, or emitted the termination marker.
    FinalAnswer,
    /// The step budget is spent.
    BudgetExhausted,
    /// An error ended the task.
    Abort,
    /// The session was reset.
    Reset,
}

/// Task state manager owned by a session.
#[derive(Debug, Clone, Copy)]
pub struct TaskLifecycle {
    session_id: SessionId,
    state: TaskState,
}

impl TaskLifecycle {
    /// Constructs an idle lifecycle for the given session.
    #[must_use]
    pub const fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: TaskState::Idle,
        }
    }

    /// Returns the owning session identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the supplied event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: TaskEvent) -> LifecycleResult<TaskState> {
        let next = match (self.state, event) {
            (
                TaskState::Idle
                | TaskState::HasFinalAnswer
                | TaskState::StepBudgetExceeded
                | TaskState::Aborted,
                TaskEvent::Begin,
            )
            | (TaskState::Executing, TaskEvent::Continue) => Some(TaskState::AwaitingModel),
            (TaskState::AwaitingModel, TaskEvent::ToolRequests) => Some(TaskState::HasToolRequests),
            (TaskState::HasToolRequests, TaskEvent::Execute) => Some(TaskState::Executing),
            (TaskState::AwaitingModel | TaskState::Executing, TaskEvent::FinalAnswer) => {
                Some(TaskState::HasFinalAnswer)
            }
            (TaskState::AwaitingModel, TaskEvent::BudgetExhausted) => {
                Some(TaskState::StepBudgetExceeded)
            }
            (_, TaskEvent::Abort) => Some(TaskState::Aborted),
            (_, TaskEvent::Reset) => Some(TaskState::Idle),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                session_id: self.session_id,
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(
                session_id = %self.session_id,
                ?self.state,
                ?next_state,
                ?event,
                "task transition"
            );
            self.state = next_state;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the task lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid task transition from {from:?} via {event:?} in session {session_id}")]
    InvalidTransition {
        /// Session whose transition failed.
        session_id: SessionId,
        /// State prior to the attempted transition.
        from: TaskState,
        /// Event that triggered the failure.
        event: TaskEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
