//! Chat event types

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatState};

/// Events emitted by the chat flow as its transcript changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The flow moved between states
    StateChanged { from: ChatState, to: ChatState },

    /// A message was added to the end of the transcript
    MessageAppended { index: usize, message: ChatMessage },

    /// The streaming reply at `index` now reads `text`
    MessageUpdate {
        index: usize,
        delta: String,
        text: String,
    },

    /// The message at `index` was dropped
    MessageRemoved { index: usize },

    /// A reply finished streaming
    TurnEnd { text: String },

    /// A turn failed; `message` is safe to show
    Error { message: String },
}

impl ChatEvent {
    /// Check if this event ends a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::TurnEnd { .. } | ChatEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let event = ChatEvent::MessageUpdate {
            index: 1,
            delta: ", ".into(),
            text: "Hello, ".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_update");
        assert_eq!(json["text"], "Hello, ");

        let state = ChatEvent::StateChanged {
            from: ChatState::Ready,
            to: ChatState::AwaitingStream,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["to"], "awaiting_stream");
    }

    #[test]
    fn test_terminal_events() {
        assert!(ChatEvent::TurnEnd { text: String::new() }.is_terminal());
        assert!(ChatEvent::Error { message: "x".into() }.is_terminal());
        assert!(!ChatEvent::MessageRemoved { index: 0 }.is_terminal());
    }
}
