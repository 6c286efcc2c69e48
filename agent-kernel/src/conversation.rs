//! Append-only conversation history.

use agent_adapters::traits::{MessageRole, PromptMessage, ToolCallRequest};

/// Ordered, role-tagged messages of one session.
///
/// Messages are only ever appended. Clearing is reserved for
/// [`Session::reset`](crate::Session::reset).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<PromptMessage>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a system message.
    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages.push(PromptMessage::new(MessageRole::System, content));
    }

    /// Appends a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(PromptMessage::new(MessageRole::User, content));
    }

    /// Appends an assistant turn together with the tool calls it requested.
    pub fn push_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) {
        self.messages.push(PromptMessage::assistant(content, tool_calls));
    }

    /// Appends the result of the tool call identified by `call_id`.
    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.messages.push(PromptMessage::tool_result(call_id, name, content));
    }

    /// Returns every message in order.
    #[must_use]
    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// Returns the tool-role messages in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &PromptMessage> {
        self.messages
            .iter()
            .filter(|message| message.role() == MessageRole::Tool)
    }

    /// Returns the most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&PromptMessage> {
        self.messages.last()
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` when nothing has been said yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Answers every call of the latest assistant turn that has no tool
    /// result yet with `content`. Returns how many results were added.
    pub(crate) fn answer_pending_calls(&mut self, content: &str) -> usize {
        let Some(turn) = self
            .messages
            .iter()
            .rposition(|message| message.role() == MessageRole::Assistant)
        else {
            return 0;
        };
        let answered: Vec<&str> = self.messages[turn + 1..]
            .iter()
            .filter_map(PromptMessage::tool_call_id)
            .collect();
        let pending: Vec<ToolCallRequest> = self.messages[turn]
            .tool_calls()
            .iter()
            .filter(|call| !answered.contains(&call.id.as_str()))
            .cloned()
            .collect();

        for call in &pending {
            self.push_tool_result(call.id.as_str(), call.name.as_str(), content);
        }
        pending.len()
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_call_ids() {
        let mut conversation = Conversation::new();
        conversation.push_system("be brief");
        conversation.push_user("what is my policy number?");
        conversation.push_assistant("", vec![ToolCallRequest::new("call_1", "get_policy", "{}")]);
        conversation.push_tool_result("call_1", "get_policy", "PN-1");

        let roles: Vec<MessageRole> = conversation
            .messages()
            .iter()
            .map(PromptMessage::role)
            .collect();
        assert_eq!(
            roles,
            [
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool
            ]
        );

        let results: Vec<_> = conversation.tool_results().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_call_id(), Some("call_1"));
        assert_eq!(conversation.last().map(PromptMessage::content), Some("PN-1"));
    }

    #[test]
    fn pending_calls_of_the_last_turn_get_a_result() {
        let mut conversation = Conversation::new();
        conversation.push_user("policy and benefits please");
        conversation.push_assistant(
            "",
            vec![
                ToolCallRequest::new("call_1", "get_policy", "{}"),
                ToolCallRequest::new("call_2", "get_benefits", "{}"),
            ],
        );
        conversation.push_tool_result("call_1", "get_policy", "PN-1");

        assert_eq!(conversation.answer_pending_calls("interrupted"), 1);
        let last = conversation.last().unwrap();
        assert_eq!(last.tool_call_id(), Some("call_2"));
        assert_eq!(last.content(), "interrupted");

        assert_eq!(conversation.answer_pending_calls("interrupted"), 0);
        assert_eq!(conversation.len(), 4);
    }
}
