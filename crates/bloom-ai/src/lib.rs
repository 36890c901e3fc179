//! bloom-ai: Gemini client layer
//!
//! This crate owns the single configured handle to the generative-AI service
//! and exposes single-shot generation plus streaming chat sessions.

pub mod client;
pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use client::{ChatSession, Client, ClientConfig, TextStream};
pub use error::{Error, Result};
pub use stream::MessageEventStream;
pub use types::*;
