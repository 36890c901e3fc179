//! Slash commands for interactive mode

use std::fmt;
use std::path::PathBuf;

/// Which flow the shell is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Identify,
    Chat,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::Identify => f.write_str("identify"),
            ModeKind::Chat => f.write_str("chat"),
        }
    }
}

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Switch to the given mode, dropping the current flow
    SwitchMode(ModeKind),
    /// Select an image file for identification
    SelectImage(PathBuf),
    /// Drop the selected image
    RemoveImage,
    /// Analyze the selected image
    Analyze,
    /// Show a message to the user
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, mode: ModeKind) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let (command, args) = match rest.split_once(' ') {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "identify" | "i" => switch(mode, ModeKind::Identify),

        "chat" | "c" => switch(mode, ModeKind::Chat),

        "image" | "open" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /image <path>".to_string())
            } else {
                CommandResult::SelectImage(PathBuf::from(args))
            }
        }

        "remove" | "r" => CommandResult::RemoveImage,

        "analyze" | "a" => CommandResult::Analyze,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn switch(current: ModeKind, target: ModeKind) -> CommandResult {
    if current == target {
        CommandResult::Message(format!("Already in {} mode.", target))
    } else {
        CommandResult::SwitchMode(target)
    }
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /identify, /i        Switch to plant identification
  /chat, /c            Switch to the Bloom gardening chat
  /image <path>        Select a photo (identify mode)
  /analyze, /a         Identify the plant in the selected photo
  /remove, /r          Remove the selected photo
  /quit, /exit, /q     Exit bloom

In identify mode, typing a file path selects that photo.
In chat mode, anything else is sent to Bloom.
Switching modes starts the other flow from scratch."#
        .to_string()
}
