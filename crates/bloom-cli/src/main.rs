//! bloom - plant identification and gardening chat CLI

mod commands;
mod config;
mod ui;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bloom_ai::Client;
use bloom_assistant::{ChatAssistant, Identifier};
use clap::{Parser, Subcommand};
use commands::{CommandResult, ModeKind};
use tracing_subscriber::EnvFilter;

/// bloom - identify plants from photos and chat about gardening
#[derive(Parser, Debug)]
#[command(name = "bloom")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Model to use (default: gemini-3-pro-preview)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the plant in a photo and print its care guide
    Identify {
        /// Image file (.png, .jpg, .jpeg, .webp)
        image: PathBuf,
    },
    /// Start the interactive shell in chat mode
    Chat,
    /// Initialize config file
    InitConfig,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        Some(EnvFilter::new("bloom=debug,bloom_ai=debug,bloom_assistant=debug"))
    } else {
        EnvFilter::try_from_default_env().ok()
    };

    if let Some(filter) = filter {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = config::Config::config_path(args.config.as_deref());

    // Initialize config and exit
    if matches!(args.command, Some(Command::InitConfig)) {
        match config::Config::init(&config_path) {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load(&config_path);

    // The credential is checked once, before anything is served
    let client = match Client::new(cfg.client_config(args.model)) {
        Ok(client) => client,
        Err(e) if e.is_configuration() => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Set your API key with: export GEMINI_API_KEY=your-key");
            eprintln!(
                "Or add it to the config file ({}): bloom init-config",
                config_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    tracing::debug!(model = %client.model().id, "client ready");

    match args.command {
        Some(Command::Identify { image }) => run_identify(client, &image).await,
        Some(Command::Chat) => run_interactive(client, ModeKind::Chat).await,
        Some(Command::InitConfig) | None => run_interactive(client, ModeKind::Identify).await,
    }
}

async fn run_identify(client: Client, image: &Path) -> anyhow::Result<()> {
    match identify_file(client, image).await {
        Ok(rendered) => {
            print!("{}", rendered);
            Ok(())
        }
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    }
}

/// Identify one photo, returning the rendered care guide or the message to
/// show the user
async fn identify_file(client: Client, image: &Path) -> Result<String, String> {
    let mut identifier = Identifier::new(client);
    if let Err(e) = identifier.select_file(image).await {
        return Err(user_message(&identifier, &e));
    }

    eprintln!("Analyzing {}...", image.display());
    match identifier.identify().await {
        Ok(result) => Ok(ui::render_blocks(result.blocks())),
        Err(e) => {
            tracing::debug!(error = ?e, "identification failed");
            Err(user_message(&identifier, &e))
        }
    }
}

fn user_message(identifier: &Identifier, error: &bloom_assistant::Error) -> String {
    identifier
        .error()
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// The active flow. Only one exists at a time; switching drops the other.
enum Mode {
    Identify(Identifier),
    Chat(ChatAssistant),
}

impl Mode {
    fn new(kind: ModeKind, client: &Client) -> Self {
        match kind {
            ModeKind::Identify => Mode::Identify(Identifier::new(client.clone())),
            ModeKind::Chat => {
                let mut chat = ChatAssistant::new(client.clone());
                chat.activate();
                Mode::Chat(chat)
            }
        }
    }

    fn kind(&self) -> ModeKind {
        match self {
            Mode::Identify(_) => ModeKind::Identify,
            Mode::Chat(_) => ModeKind::Chat,
        }
    }
}

async fn run_interactive(client: Client, initial: ModeKind) -> anyhow::Result<()> {
    let mut mode = Mode::new(initial, &client);

    // Show minimal startup info (only if TTY)
    if io::IsTerminal::is_terminal(&io::stderr()) {
        eprintln!("bloom ({}) - type /help for commands", client.model().id);
        eprintln!();
    }

    loop {
        print!("{}> ", mode.kind());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, mode.kind()) {
            match result {
                CommandResult::SwitchMode(kind) => {
                    mode = Mode::new(kind, &client);
                    println!("Switched to {} mode.", kind);
                }
                CommandResult::SelectImage(path) => match &mut mode {
                    Mode::Identify(identifier) => select_image(identifier, &path).await,
                    Mode::Chat(_) => println!("Switch to /identify to select a photo."),
                },
                CommandResult::RemoveImage => match &mut mode {
                    Mode::Identify(identifier) => {
                        identifier.remove_image();
                        println!("Image removed.");
                    }
                    Mode::Chat(_) => println!("No photo in chat mode."),
                },
                CommandResult::Analyze => match &mut mode {
                    Mode::Identify(identifier) => identify(identifier).await,
                    Mode::Chat(_) => println!("Switch to /identify to analyze a photo."),
                },
                CommandResult::Message(msg) => {
                    println!("{}", msg);
                }
                CommandResult::Exit => {
                    break;
                }
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        match &mut mode {
            Mode::Identify(identifier) => select_image(identifier, Path::new(input)).await,
            Mode::Chat(chat) => chat_turn(chat, input).await,
        }
    }

    Ok(())
}

async fn select_image(identifier: &mut Identifier, path: &Path) {
    if identifier.select_file(path).await.is_err() {
        if let Some(message) = identifier.error() {
            eprintln!("{}", message);
        }
        return;
    }
    if let Some(image) = identifier.image() {
        println!(
            "Selected {} ({}). Type /analyze to identify it.",
            path.display(),
            image.mime_type()
        );
    }
}

async fn identify(identifier: &mut Identifier) {
    if identifier.can_identify() {
        println!("Analyzing...");
    }
    match identifier.identify().await {
        Ok(result) => {
            println!();
            print!("{}", ui::render_blocks(result.blocks()));
            println!();
        }
        Err(_) => {
            if let Some(message) = identifier.error() {
                eprintln!("{}", message);
            }
        }
    }
}

async fn chat_turn(chat: &mut ChatAssistant, utterance: &str) {
    let printer = tokio::spawn(ui::print_chat_events(chat.subscribe()));

    match chat.send(utterance).await {
        Ok(_) | Err(bloom_assistant::Error::Stream(_)) => {
            let _ = printer.await;
        }
        // Rejected before anything was emitted
        Err(e) => {
            printer.abort();
            if !e.is_silent() {
                eprintln!("{}", e);
            }
        }
    }
}
