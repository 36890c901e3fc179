//! In-memory provider for flow tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bloom_ai::{
    Client, Context, Error, FinishReason, GenerationConfig, Message, MessageEventStream, Model,
    ModelMetadata, Result, Usage, providers::LlmProvider, stream::MessageEvent,
};

/// One scripted answer
pub(crate) enum Reply {
    /// Fragments followed by normal completion
    Fragments(Vec<String>),
    /// Fragments followed by a mid-stream error
    FailAfter(Vec<String>, String),
    /// The call itself fails
    Fail(String),
}

impl Reply {
    pub(crate) fn text(parts: &[&str]) -> Self {
        Reply::Fragments(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// Answers calls from a queue of replies and records every request.
pub(crate) struct ScriptedProvider {
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<Context>>,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<Context> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, context: &Context) -> Reply {
        self.requests.lock().unwrap().push(context.clone());
        let mut replies = self.replies.lock().unwrap();
        assert!(!replies.is_empty(), "unexpected call to the provider");
        replies.remove(0)
    }
}

pub(crate) fn client_for(provider: &Arc<ScriptedProvider>) -> Client {
    Client::with_provider(
        Arc::clone(provider) as Arc<dyn LlmProvider>,
        Model::default(),
        GenerationConfig::default(),
    )
}

fn done(text: String) -> MessageEvent {
    MessageEvent::Done {
        message: Message::Model {
            content: vec![bloom_ai::Content::text(text)],
            metadata: ModelMetadata::default(),
        },
        finish_reason: FinishReason::Stop,
        usage: Usage::default(),
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, _model: &Model, context: &Context) -> Result<Message> {
        match self.next(context) {
            Reply::Fragments(parts) => Ok(Message::Model {
                content: vec![bloom_ai::Content::text(parts.concat())],
                metadata: ModelMetadata::default(),
            }),
            Reply::FailAfter(_, message) => Err(Error::Sse(message)),
            Reply::Fail(message) => Err(Error::api("UNAVAILABLE", message)),
        }
    }

    async fn stream(&self, _model: &Model, context: &Context) -> Result<MessageEventStream> {
        let (parts, failure) = match self.next(context) {
            Reply::Fragments(parts) => (parts, None),
            Reply::FailAfter(parts, message) => (parts, Some(message)),
            Reply::Fail(message) => return Err(Error::api("UNAVAILABLE", message)),
        };

        Ok(Box::pin(async_stream::stream! {
            let full = parts.concat();
            for delta in parts {
                tokio::task::yield_now().await;
                yield MessageEvent::TextDelta { delta };
            }
            match failure {
                Some(message) => yield MessageEvent::Error { message },
                None => yield done(full),
            }
        }))
    }
}
