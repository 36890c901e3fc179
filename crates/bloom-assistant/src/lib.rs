//! bloom-assistant: Plant identification and gardening chat
//!
//! Two independent flows share one [`bloom_ai::Client`]: the [`Identifier`]
//! sends a single photo for analysis and splits the reply into headed
//! blocks, and the [`ChatAssistant`] holds a streaming conversation with the
//! Bloom persona.

pub mod chat;
pub mod error;
pub mod events;
pub mod identifier;
pub mod image;
pub mod sections;

#[cfg(test)]
mod test_support;

pub use chat::{ChatAssistant, ChatMessage, ChatState, PERSONA, Sender};
pub use error::{Error, Result, ValidationError};
pub use events::ChatEvent;
pub use identifier::{IDENTIFY_PROMPT, Identifier, analyze};
pub use image::{ImageMimeType, ImagePayload};
pub use sections::{AnalysisResult, Block, BlockKind, parse_sections};
