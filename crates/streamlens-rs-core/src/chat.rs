//! Conversation state for follow-up questions about a finished run.

use streamlens_rs_protocol::TaskId;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// The person asking about the run.
    User,
    /// The model's answer.
    Assistant,
}

impl ChatRole {
    /// Stable string form used for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a run conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

/// Ordered history of questions and answers about one analysis run.
///
/// Answers arrive over the shared channel, which redelivers under
/// reconnect churn; the history therefore refuses an assistant message that
/// merely repeats the previous entry.
#[derive(Debug, Clone)]
pub struct ChatSession {
    task_id: TaskId,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Start an empty conversation about the given run.
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            messages: Vec::new(),
        }
    }

    /// Run the conversation is about.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Append a user question.
    pub fn record_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        });
    }

    /// Append an assistant answer.
    ///
    /// The answer is dropped when the history is empty or when it repeats the
    /// most recent message verbatim; returns whether it was appended.
    pub fn record_assistant(&mut self, content: &str) -> bool {
        let duplicate = match self.messages.last() {
            Some(last) => last.content == content,
            None => return false,
        };
        if duplicate {
            return false;
        }
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.to_string(),
        });
        true
    }

    /// Forget all messages, keeping the run binding.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
