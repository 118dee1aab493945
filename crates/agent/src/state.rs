//! Turn state: the message log a strategy appends to while it runs a turn.

use depo_core::message::{Message, MessageToolCall, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Build the system message that tells the model a document is attached.
pub fn document_directive(document_ref: &str) -> Message {
    let filename = Path::new(document_ref)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(document_ref);
    Message::system(format!(
        "A document is available for this conversation. Use the search_document tool \
         to answer questions about it. Document filename: {filename}."
    ))
}

/// Ordered, append-only message history for one turn, plus the reasoning
/// step counter and the bound document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnState {
    pub messages: Vec<Message>,
    /// Reasoning steps that called the model during the current turn.
    pub llm_calls: u32,
    pub document_ref: Option<String>,
}

impl TurnState {
    pub fn new(document_ref: Option<String>) -> Self {
        Self {
            messages: Vec::new(),
            llm_calls: 0,
            document_ref,
        }
    }

    /// Continue from earlier messages. The counter starts at zero and any
    /// trailing tool requests that never got answers are dropped.
    pub fn from_history(history: Vec<Message>, document_ref: Option<String>) -> Self {
        let mut state = Self {
            messages: history,
            llm_calls: 0,
            document_ref,
        };
        state.drop_unanswered_tail();
        state
    }

    /// Open a turn: the document directive (once per distinct document)
    /// followed by the user's message.
    pub fn begin_turn(&mut self, user_message: &str) {
        if let Some(document_ref) = &self.document_ref {
            let directive = document_directive(document_ref);
            let already_present = self
                .messages
                .iter()
                .any(|m| m.role == Role::System && m.content == directive.content);
            if !already_present {
                self.messages.push(directive);
            }
        }
        self.messages.push(Message::user(user_message));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Tool requests of the last message, if it is an assistant message.
    pub fn pending_tool_calls(&self) -> Vec<MessageToolCall> {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => m.tool_calls.clone(),
            _ => Vec::new(),
        }
    }

    /// Text of the most recent non-empty assistant message.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty())
    }

    /// Tool-result messages, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::Tool)
    }

    /// Every tool result answers a request from the nearest preceding
    /// assistant message, and each request is answered at most once.
    pub fn is_well_paired(&self) -> bool {
        let mut open: HashSet<&str> = HashSet::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    open = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
                }
                Role::Tool => {
                    let Some(id) = message.tool_call_id.as_deref() else {
                        return false;
                    };
                    if !open.remove(id) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }

    fn drop_unanswered_tail(&mut self) {
        if self.messages.last().is_some_and(|m| m.role == Role::Assistant && m.has_tool_calls()) {
            self.messages.pop();
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn directive_names_the_file_only() {
        let msg = document_directive("/data/uploads/abc_depo.pdf");
        assert_eq!(msg.role, Role::System);
        assert!(msg.content.ends_with("Document filename: abc_depo.pdf."));
        assert!(msg.content.contains("search_document"));
    }

    #[test]
    fn begin_turn_adds_directive_once() {
        let mut state = TurnState::new(Some("depo.pdf".into()));
        state.begin_turn("Who is the witness?");
        state.push(Message::assistant("Jane Doe."));
        state.begin_turn("Where was she?");

        let directives = state.messages.iter().filter(|m| m.role == Role::System).count();
        assert_eq!(directives, 1);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[0].role, Role::System);
    }

    #[test]
    fn no_directive_without_document() {
        let mut state = TurnState::new(None);
        state.begin_turn("hi");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::User);
    }

    #[test]
    fn pairing_detects_orphans() {
        let call = MessageToolCall::new("c1", "search_web", json!({"query": "x"}));
        let mut state = TurnState::new(None);
        state.begin_turn("q");
        state.push(Message::assistant_with_tools("", vec![call.clone()]));
        state.push(Message::tool_result(&call, "result"));
        assert!(state.is_well_paired());

        state.push(Message::tool_result(&call, "again"));
        assert!(!state.is_well_paired());
    }

    #[test]
    fn history_drops_unanswered_requests() {
        let call = MessageToolCall::new("c1", "search_web", json!({}));
        let history = vec![
            Message::user("q"),
            Message::assistant_with_tools("", vec![call]),
        ];
        let state = TurnState::from_history(history, None);
        assert_eq!(state.messages.len(), 1);
        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn last_assistant_text_skips_empty() {
        let mut state = TurnState::new(None);
        state.push(Message::assistant("first"));
        state.push(Message::assistant("  "));
        assert_eq!(state.last_assistant_text(), Some("first"));
    }
}
