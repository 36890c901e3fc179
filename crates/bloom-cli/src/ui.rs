//! Terminal rendering for both modes

use std::io::{self, Write};

use bloom_assistant::{Block, BlockKind, ChatEvent, Sender};
use tokio::sync::broadcast::{self, error::RecvError};

/// Render analysis blocks as underlined headings followed by their bodies
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();

    for block in blocks {
        if !out.is_empty() {
            out.push('\n');
        }

        let underline = match block.kind {
            BlockKind::Section => Some('='),
            BlockKind::Subsection => Some('-'),
            BlockKind::Paragraph => None,
        };
        if let Some(ch) = underline {
            let heading = block.heading().unwrap_or_default();
            out.push_str(heading);
            out.push('\n');
            out.extend(std::iter::repeat_n(ch, heading.chars().count()));
            out.push('\n');
        }

        let body = block.body();
        if !body.is_empty() {
            out.push_str(body);
            out.push('\n');
        }
    }

    out
}

/// How much of the streaming reply has reached the terminal
#[derive(Debug, Default)]
struct ReplyCursor {
    shown: usize,
}

impl ReplyCursor {
    fn reset(&mut self) {
        self.shown = 0;
    }

    /// The part of `text` not printed yet. Updates skipped by a lagging
    /// receiver are recovered here since `text` is always the whole reply.
    fn unseen<'a>(&mut self, text: &'a str) -> &'a str {
        let unseen = text.get(self.shown..).unwrap_or("");
        self.shown = self.shown.max(text.len());
        unseen
    }
}

/// Print chat events until the turn ends
pub async fn print_chat_events(mut receiver: broadcast::Receiver<ChatEvent>) {
    let mut cursor = ReplyCursor::default();
    loop {
        match receiver.recv().await {
            Ok(event) => {
                render_chat_event(&event, &mut cursor);
                if event.is_terminal() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "chat renderer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn render_chat_event(event: &ChatEvent, cursor: &mut ReplyCursor) {
    match event {
        ChatEvent::MessageAppended { message, .. } if message.sender == Sender::Assistant => {
            cursor.reset();
            print!("bloom: ");
            let _ = io::stdout().flush();
        }
        ChatEvent::MessageUpdate { text, .. } => {
            print!("{}", cursor.unseen(text));
            let _ = io::stdout().flush();
        }
        ChatEvent::TurnEnd { .. } => {
            println!();
            println!();
        }
        // End the partial line before the error
        ChatEvent::MessageRemoved { .. } => println!(),
        ChatEvent::Error { message } => {
            eprintln!("{}", message);
            eprintln!();
        }
        _ => {}
    }
}
