//! Capability resolution and the dispatch loop.
//!
//! This crate ties the catalog, index, and per-session registry into a
//! runtime: a [`Session`] owns its conversation and registrations, the
//! [`CapabilityResolver`] turns descriptions into catalog tools, and the
//! [`Dispatcher`] drives model turns and tool calls until a task ends.
//! [`AgentKernel`] adds bounded-concurrency scheduling on top.

#![warn(missing_docs, clippy::pedantic)]

mod conversation;
mod dispatch;
mod embedding;
mod lifecycle;
mod poll;
mod resolver;
mod scheduler;
mod session;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::task::JoinHandle;

pub use conversation::Conversation;
pub use dispatch::{DispatchError, DispatchResult, Dispatcher, TaskOutcome};
pub use embedding::AdapterEmbedder;
pub use lifecycle::{LifecycleError, LifecycleResult, TaskEvent, TaskLifecycle, TaskState};
pub use poll::{RunBackend, RunOutcome, RunPoller, RunSnapshot, ToolOutput};
pub use resolver::{CapabilityResolver, ResolutionError, ResolutionResult};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskScheduler};
pub use session::Session;

/// A finished spawned task: the session it ran in and its result.
pub type TaskReport = (Session, DispatchResult<TaskOutcome>);

/// Runtime that runs session tasks inline or on the scheduler.
#[derive(Debug, Clone)]
pub struct AgentKernel {
    dispatcher: Arc<Dispatcher>,
    scheduler: TaskScheduler,
}

impl AgentKernel {
    /// Creates a kernel with the provided dispatcher and scheduler.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, scheduler: TaskScheduler) -> Self {
        Self {
            dispatcher,
            scheduler,
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns a reference to the underlying scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Runs one task on the current task.
    ///
    /// # Errors
    ///
    /// Propagates [`DispatchError`] from [`Dispatcher::run`].
    pub async fn run_task(
        &self,
        session: &mut Session,
        user_message: impl Into<String>,
    ) -> DispatchResult<TaskOutcome> {
        self.dispatcher.run(session, user_message).await
    }

    /// Moves `session` onto the scheduler and runs one task there. The
    /// handle yields the session back together with the result, or
    /// [`SchedulerError::Closed`] if the scheduler closed before the task
    /// started.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Closed`] when the scheduler has been closed.
    pub fn spawn_task(
        &self,
        mut session: Session,
        user_message: impl Into<String>,
    ) -> SchedulerResult<JoinHandle<SchedulerResult<TaskReport>>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let user_message = user_message.into();
        self.scheduler.spawn(async move {
            let result = dispatcher.run(&mut session, user_message).await;
            (session, result)
        })
    }
}
