//! Per-session state: history, registrations, task lifecycle.

use agent_primitives::SessionId;
use agent_tools::ToolRegistry;
use tracing::info;

use crate::conversation::Conversation;
use crate::lifecycle::{TaskEvent, TaskLifecycle, TaskState};

/// State owned by one conversation.
///
/// Sessions are never shared; concurrent conversations each own their
/// registry and history.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    conversation: Conversation,
    registry: ToolRegistry,
    lifecycle: TaskLifecycle,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session with a random id and the bootstrap tool registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(SessionId::random())
    }

    /// Creates a session with the supplied id.
    #[must_use]
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            conversation: Conversation::new(),
            registry: ToolRegistry::with_bootstrap(),
            lifecycle: TaskLifecycle::new(id),
        }
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the conversation history.
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the tools exposed to this session.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Returns the state of the current or last task.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.lifecycle.state()
    }

    /// Clears history and every registration except the bootstrap tool.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.registry.reset();
        // Reset is accepted from every state.
        let _ = self.lifecycle.transition(TaskEvent::Reset);
        info!(session_id = %self.id, "session reset");
    }

    pub(crate) fn parts_mut(
        &mut self,
    ) -> (&mut Conversation, &mut ToolRegistry, &mut TaskLifecycle) {
        (
            &mut self.conversation,
            &mut self.registry,
            &mut self.lifecycle,
        )
    }

    pub(crate) fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }
}
