//! Streaming event types and utilities

use crate::types::{Content, FinishReason, Message, ModelMetadata, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while a reply streams in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Initial message structure
    Start { message: Message },
    /// Text content delta
    TextDelta { delta: String },
    /// Reply completed successfully
    Done {
        message: Message,
        finish_reason: FinishReason,
        usage: Usage,
    },
    /// Error occurred
    Error { message: String },
}

/// A stream of message events
pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Builder for constructing a model reply from streaming events
#[derive(Debug, Default)]
pub struct MessageBuilder {
    text: String,
    model: Option<String>,
    usage: Usage,
    finish_reason: Option<FinishReason>,
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the message state
    pub fn process_event(&mut self, event: &MessageEvent) {
        match event {
            MessageEvent::Start { message } => {
                if let Some(metadata) = message.metadata() {
                    self.model = metadata.model.clone();
                }
            }
            MessageEvent::TextDelta { delta } => {
                self.text.push_str(delta);
            }
            MessageEvent::Done {
                finish_reason,
                usage,
                ..
            } => {
                self.finish_reason = Some(*finish_reason);
                self.usage = usage.clone();
            }
            MessageEvent::Error { .. } => {}
        }
    }

    /// Build the final message
    pub fn build(self) -> Message {
        let content = if self.text.is_empty() {
            vec![]
        } else {
            vec![Content::Text { text: self.text }]
        };

        Message::Model {
            content,
            metadata: ModelMetadata {
                model: self.model,
                usage: self.usage,
                finish_reason: self.finish_reason,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_in_order() {
        let mut builder = MessageBuilder::new();
        for delta in ["Hello", ", ", "gardener!"] {
            builder.process_event(&MessageEvent::TextDelta {
                delta: delta.to_string(),
            });
        }

        builder.process_event(&MessageEvent::Done {
            message: Message::Model {
                content: vec![],
                metadata: ModelMetadata::default(),
            },
            finish_reason: FinishReason::Stop,
            usage: Usage { input: 12, output: 4 },
        });

        let message = builder.build();
        assert_eq!(message.text(), "Hello, gardener!");
        let metadata = message.metadata().unwrap();
        assert_eq!(metadata.finish_reason, Some(FinishReason::Stop));
        assert_eq!(metadata.usage, Usage { input: 12, output: 4 });
    }

    #[test]
    fn test_builder_empty_reply_has_no_content() {
        let message = MessageBuilder::new().build();
        assert!(message.content().is_empty());
        assert_eq!(message.role(), "model");
    }
}
