//! The configured service handle shared by both flows
//!
//! A [`Client`] is built once at startup and exposes two capabilities:
//! single-shot generation ([`Client::generate_content`]) and stateful chat
//! sessions ([`Client::create_chat`]) whose turns stream back as text
//! fragments.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::{
    Content, Context, Error, GenerationConfig, Message, Model, Result,
    providers::{LlmProvider, google::GoogleProvider, resolve_api_key},
    stream::{MessageBuilder, MessageEvent},
};

/// Settings needed to build a [`Client`]
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Explicit credential; the environment is searched when absent
    pub api_key: Option<String>,
    /// Model to talk to
    pub model: Model,
    /// Sampling settings applied to every request
    pub generation: GenerationConfig,
}

/// Handle to the generative-AI service
#[derive(Clone)]
pub struct Client {
    provider: Arc<dyn LlmProvider>,
    model: Model,
    generation: GenerationConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("model", &self.model)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a Gemini client, failing when no credential is available
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::build(config, |var| std::env::var(var).ok())
    }

    fn build(config: ClientConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = resolve_api_key(config.api_key.as_deref(), env)?;
        if config.model.id.trim().is_empty() {
            return Err(Error::InvalidConfig("model id is empty".into()));
        }
        if !config.model.base_url.starts_with("http://") && !config.model.base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "base URL must be http(s): {}",
                config.model.base_url
            )));
        }

        Ok(Self::with_provider(
            Arc::new(GoogleProvider::new(api_key)),
            config.model,
            config.generation,
        ))
    }

    /// Build a client around any provider
    pub fn with_provider(
        provider: Arc<dyn LlmProvider>,
        model: Model,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            provider,
            model,
            generation,
        }
    }

    /// The configured model
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Send one request and return the complete reply text.
    ///
    /// A reply without usable text is an [`Error::EmptyResponse`].
    pub async fn generate_content(&self, contents: Vec<Content>) -> Result<String> {
        let mut context = Context {
            generation: self.generation.clone(),
            ..Default::default()
        };
        context.push(Message::user_with_content(contents));

        let reply = self.provider.generate(&self.model, &context).await?;
        let text = reply.text();
        if text.trim().is_empty() {
            let reason = reply
                .metadata()
                .and_then(|m| m.finish_reason)
                .map(|r| format!("{:?}", r).to_uppercase());
            return Err(Error::EmptyResponse(reason));
        }
        Ok(text)
    }

    /// Start a conversation bound to a fixed system instruction
    pub fn create_chat(&self, system_instruction: impl Into<String>) -> ChatSession {
        let mut context = Context::with_system(system_instruction);
        context.generation = self.generation.clone();
        let session = ChatSession {
            id: Uuid::new_v4(),
            provider: Arc::clone(&self.provider),
            model: self.model.clone(),
            context,
        };
        tracing::debug!(session_id = %session.id, model = %session.model.id, "chat session created");
        session
    }
}

/// A stream of reply fragments
pub type TextStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// A multi-turn conversation.
///
/// The Gemini REST API keeps no server-side state, so the session holds the
/// history and re-sends it with every turn. A turn enters the history only
/// once its reply has streamed to completion.
pub struct ChatSession {
    id: Uuid,
    provider: Arc<dyn LlmProvider>,
    model: Model,
    context: Context,
}

impl ChatSession {
    /// Identifier used to correlate log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The persona instruction this session was created with
    pub fn system_instruction(&self) -> Option<&str> {
        self.context.system_prompt.as_deref()
    }

    /// Completed turns, oldest first
    pub fn history(&self) -> &[Message] {
        &self.context.messages
    }

    /// Send a user turn and stream the reply.
    ///
    /// Yields each non-empty fragment in arrival order. An `Err` item ends
    /// the stream and leaves the history untouched.
    pub fn send_message_stream(&mut self, text: &str) -> TextStream<'_> {
        let user = Message::user(text);

        Box::pin(stream! {
            let mut request = self.context.clone();
            request.push(user.clone());
            tracing::debug!(session_id = %self.id, turns = request.messages.len(), "sending turn");

            let mut events = match self.provider.stream(&self.model, &request).await {
                Ok(events) => events,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut builder = MessageBuilder::new();
            let mut completed = false;

            while let Some(event) = events.next().await {
                builder.process_event(&event);
                match event {
                    MessageEvent::TextDelta { delta } => {
                        if !delta.is_empty() {
                            yield Ok(delta);
                        }
                    }
                    MessageEvent::Done { .. } => {
                        completed = true;
                        break;
                    }
                    MessageEvent::Error { message } => {
                        yield Err(Error::Sse(message));
                        return;
                    }
                    MessageEvent::Start { .. } => {}
                }
            }

            if !completed {
                yield Err(Error::UnexpectedResponse("stream ended before completion".into()));
                return;
            }

            let reply = builder.build();
            tracing::debug!(
                session_id = %self.id,
                chars = reply.text().len(),
                "turn recorded"
            );
            self.context.push(user);
            self.context.push(reply);
        })
    }
}
