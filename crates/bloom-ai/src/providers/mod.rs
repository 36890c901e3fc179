//! Generative-AI provider implementations

pub mod google;

use crate::{Context, Error, Message, MessageEventStream, Model, Result};
use async_trait::async_trait;

/// Environment variables searched for a credential, in order
pub const API_KEY_ENV_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Trait for generative-AI providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate one complete reply
    async fn generate(&self, model: &Model, context: &Context) -> Result<Message>;

    /// Stream a reply as incremental events
    async fn stream(&self, model: &Model, context: &Context) -> Result<MessageEventStream>;
}

/// Resolve a credential, consulting `lookup` for each of [`API_KEY_ENV_VARS`]
/// when no usable key was provided
pub(crate) fn resolve_api_key(
    provided: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    if let Some(key) = provided.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .ok_or(Error::MissingApiKey)
}
