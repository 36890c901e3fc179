//! The gardening chat: one session, a transcript, and a streaming turn loop

use bloom_ai::{ChatSession, Client, TextStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    error::{CHAT_FAILED_MESSAGE, Error, Result, ValidationError},
    events::ChatEvent,
};

/// System instruction the session is created with
pub const PERSONA: &str = "You are a friendly and knowledgeable gardening assistant. Your name is 'Bloom'. Answer questions about plants, gardening techniques, pest control, and anything related to horticulture. Keep your answers concise and helpful.";

/// Where the chat flow is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    /// No session yet
    Uninitialized,
    /// Waiting for the next utterance
    Ready,
    /// A reply is streaming; input is disabled
    AwaitingStream,
    /// A turn just failed; passes back to `Ready` once cleaned up
    Error,
}

/// Who wrote a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A single message in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

/// The conversational flow
pub struct ChatAssistant {
    client: Client,
    session: Option<ChatSession>,
    state: ChatState,
    transcript: Vec<ChatMessage>,
    error: Option<String>,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatAssistant {
    /// Create an inactive flow; call [`activate`](Self::activate) before sending
    pub fn new(client: Client) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            client,
            session: None,
            state: ChatState::Uninitialized,
            transcript: Vec::new(),
            error: None,
            event_tx,
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// Open the session. Later calls keep the existing one.
    pub fn activate(&mut self) {
        if self.session.is_some() {
            return;
        }
        self.session = Some(self.client.create_chat(PERSONA));
        self.set_state(ChatState::Ready);
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// User-visible error from the last turn
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether input should be disabled
    pub fn is_busy(&self) -> bool {
        self.state == ChatState::AwaitingStream
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// Send one utterance and stream the reply into the transcript.
    ///
    /// Returns the complete reply text. Blank input is rejected without
    /// touching anything. On failure the partial reply is removed, the user
    /// message stays, and a fixed error message is recorded.
    pub async fn send(&mut self, utterance: &str) -> Result<String> {
        if utterance.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        match self.state {
            ChatState::Uninitialized => return Err(ValidationError::NotActivated.into()),
            ChatState::AwaitingStream => return Err(ValidationError::Busy.into()),
            ChatState::Ready | ChatState::Error => {}
        }
        if self.session.is_none() {
            return Err(ValidationError::NotActivated.into());
        }

        self.push_message(ChatMessage::user(utterance));
        self.error = None;
        self.set_state(ChatState::AwaitingStream);

        let index = self.transcript.len();
        self.push_message(ChatMessage::assistant(""));

        let mut accumulated = String::new();
        let outcome = match self.session.as_mut() {
            Some(session) => {
                let transcript = &mut self.transcript;
                let events = &self.event_tx;
                let fragments = session.send_message_stream(utterance);
                apply_fragments(fragments, &mut accumulated, |delta, text| {
                    text.clone_into(&mut transcript[index].text);
                    let _ = events.send(ChatEvent::MessageUpdate {
                        index,
                        delta: delta.to_string(),
                        text: text.to_string(),
                    });
                })
                .await
            }
            None => Err(bloom_ai::Error::UnexpectedResponse("session closed".into())),
        };

        match outcome {
            Ok(()) => {
                self.set_state(ChatState::Ready);
                self.emit(ChatEvent::TurnEnd {
                    text: accumulated.clone(),
                });
                Ok(accumulated)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    session_id = ?self.session.as_ref().map(|s| s.id()),
                    partial_chars = accumulated.len(),
                    "chat turn failed"
                );
                self.set_state(ChatState::Error);
                self.transcript.remove(index);
                self.emit(ChatEvent::MessageRemoved { index });
                self.error = Some(CHAT_FAILED_MESSAGE.to_string());
                self.emit(ChatEvent::Error {
                    message: CHAT_FAILED_MESSAGE.to_string(),
                });
                self.set_state(ChatState::Ready);
                Err(Error::Stream(e))
            }
        }
    }

    fn push_message(&mut self, message: ChatMessage) {
        let index = self.transcript.len();
        self.transcript.push(message.clone());
        self.emit(ChatEvent::MessageAppended { index, message });
    }

    fn set_state(&mut self, to: ChatState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            tracing::debug!(?from, ?to, "chat state changed");
            self.emit(ChatEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Fold fragments into `accumulated`, reporting each delta with the full text.
///
/// Stops at the first error; `accumulated` keeps what arrived before it.
async fn apply_fragments(
    mut fragments: TextStream<'_>,
    accumulated: &mut String,
    mut on_update: impl FnMut(&str, &str),
) -> bloom_ai::Result<()> {
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        accumulated.push_str(&fragment);
        on_update(&fragment, accumulated);
    }
    Ok(())
}
