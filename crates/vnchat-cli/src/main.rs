//! vnchat - visual-novel character chat with long-term memory

mod commands;
mod config;
mod library;
mod printer;
mod profile;
mod recommend;
mod session;

use clap::Parser;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use vnchat_ai::providers::provider_for;
use vnchat_core::{
    ChatSession, Error, LlmGenerationService, ModelEndpoint, TurnEvent, TurnKind, TurnReport,
};

use commands::CommandResult;
use config::Config;
use library::CharacterLibrary;
use printer::EventPrinter;
use profile::UserProfile;
use session::SessionLog;

/// vnchat - chat with visual-novel characters on a local model
#[derive(Parser, Debug)]
#[command(name = "vnchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP (character folder) to pick the character from
    #[arg(long)]
    ip: Option<String>,

    /// Character path within the IP, without `.json`
    #[arg(long)]
    character: Option<String>,

    /// Character library root
    #[arg(long)]
    characters_dir: Option<std::path::PathBuf>,

    /// Username for the tag ledger
    #[arg(short, long)]
    user: Option<String>,

    /// Model for narration and dialogue (e.g. llama3, openai:mistral-7b)
    #[arg(short, long)]
    model: Option<String>,

    /// Model for summaries and fact extraction
    #[arg(long)]
    memory_model: Option<String>,

    /// Server protocol (ollama, openai)
    #[arg(long)]
    api: Option<String>,

    /// Server base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Run a single turn with this input and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Resume a previous session by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved sessions
    #[arg(long)]
    sessions: bool,

    /// List the character library
    #[arg(long)]
    list_characters: bool,

    /// Add a character from a JSON file to the library (requires --ip)
    #[arg(long, value_name = "FILE")]
    create_character: Option<std::path::PathBuf>,

    /// Optional sub-folder within the IP for --create-character
    #[arg(long)]
    unit: Option<String>,

    /// Recommend characters from your tag history
    #[arg(long)]
    recommend: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command-line flags take precedence over the config file
    fn apply_to(&self, cfg: &mut Config) {
        let overrides = [
            (&self.model, &mut cfg.model),
            (&self.memory_model, &mut cfg.memory_model),
            (&self.api, &mut cfg.api),
            (&self.base_url, &mut cfg.base_url),
            (&self.user, &mut cfg.username),
        ];
        for (arg, field) in overrides {
            if arg.is_some() {
                field.clone_from(arg);
            }
        }
        if self.characters_dir.is_some() {
            cfg.characters_dir.clone_from(&self.characters_dir);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never interleave with streamed chat text
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("vnchat=debug,vnchat_core=debug,vnchat_ai=debug")
            .with_writer(io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }

    if args.init_config {
        match Config::init() {
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

    if args.sessions {
        return list_sessions();
    }

    let mut cfg = Config::load();
    args.apply_to(&mut cfg);

    let library = CharacterLibrary::new(cfg.characters_dir());
    let users_dir = cfg.users_dir();
    let mut profile = UserProfile::load_or_create(&users_dir, &cfg.username())?;

    if let Some(ref file) = args.create_character {
        return create_character(&library, args.ip.as_deref(), args.unit.as_deref(), file);
    }

    if args.list_characters {
        return list_characters(&library);
    }

    if args.recommend {
        return show_recommendations(&library, &profile);
    }

    let character_model = cfg.resolve_character_model()?;
    let memory_model = cfg.resolve_memory_model()?;
    let options = cfg.stream_options();
    let api_key = cfg.api_key.as_deref();
    let service = Arc::new(LlmGenerationService::new(
        ModelEndpoint::new(provider_for(&character_model, api_key), character_model.clone())
            .with_options(options.clone()),
        ModelEndpoint::new(provider_for(&memory_model, api_key), memory_model.clone())
            .with_options(options),
    ));

    let sessions_dir = SessionLog::sessions_dir();
    let (mut chat, mut log) = if let Some(ref session_id) = args.resume {
        let (log, snapshot) = match SessionLog::open(&sessions_dir, session_id) {
            Ok(opened) => opened,
            Err(e) => {
                eprintln!("Error loading session: {}", e);
                std::process::exit(1);
            }
        };
        let Some(snapshot) = snapshot else {
            eprintln!("Session {} has no saved turns to resume.", session_id);
            std::process::exit(1);
        };
        println!(
            "Resuming session {} with {} ({} messages)",
            session_id,
            snapshot.character.name,
            snapshot.transcript.len()
        );
        (ChatSession::restore(snapshot, service), Some(log))
    } else {
        let (Some(ip), Some(path)) = (args.ip.as_deref(), args.character.as_deref()) else {
            eprintln!("Choose a character with --ip <ip> --character <path>.");
            eprintln!("Run `vnchat --list-characters` to browse the library.");
            std::process::exit(1);
        };
        let character = library.load(ip, path)?;
        let chat = ChatSession::new(character, service);
        let log = if cfg.sessions_enabled() {
            match SessionLog::create(&sessions_dir, &character_model.id, &chat.snapshot()) {
                Ok(log) => Some(log),
                Err(e) => {
                    tracing::warn!("Session autosave disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        (chat, log)
    };

    let printer = EventPrinter::new(chat.character().name.clone(), args.verbose);
    let mut app = App {
        chat: &mut chat,
        log: log.as_mut(),
        profile: &mut profile,
        users_dir: &users_dir,
        printer,
    };

    if let Some(command) = args.command {
        let receiver = app.chat.subscribe();
        let result = drive(&app.printer, receiver, app.chat.submit(&command)).await;
        app.finish_turn(&command, result);
        return Ok(());
    }

    run_interactive(&mut app).await
}

/// Run a turn while streaming its events to the terminal
async fn drive<F>(
    printer: &EventPrinter,
    mut receiver: broadcast::Receiver<TurnEvent>,
    turn: F,
) -> vnchat_core::Result<TurnReport>
where
    F: Future<Output = vnchat_core::Result<TurnReport>>,
{
    tokio::pin!(turn);

    loop {
        tokio::select! {
            result = &mut turn => {
                // Events sent right before completion are still queued
                while let Ok(event) = receiver.try_recv() {
                    printer.print(&event);
                }
                return result;
            }
            event = receiver.recv() => match event {
                Ok(event) => printer.print(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {} turn events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return (&mut turn).await,
            },
        }
    }
}

/// State shared by the interactive loop and one-shot mode
struct App<'a> {
    chat: &'a mut ChatSession,
    log: Option<&'a mut SessionLog>,
    profile: &'a mut UserProfile,
    users_dir: &'a std::path::Path,
    printer: EventPrinter,
}

impl App<'_> {
    /// Report a finished turn, count tags, and save
    fn finish_turn(&mut self, input: &str, result: vnchat_core::Result<TurnReport>) {
        match result {
            Ok(report) => {
                if report.kind == TurnKind::Ignored {
                    println!("(nothing to continue yet)");
                }
                self.record_tags(&report.tags);
            }
            Err(e) if e.is_memory_failure() => {
                eprintln!("[memory update failed: {}] The reply was kept.", e);
                if !input.trim().is_empty() {
                    let tags = self.chat.character().tags();
                    self.record_tags(&tags);
                }
            }
            Err(e) if e.is_generation_failure() => {
                eprintln!("\nGeneration failed: {}", e);
                eprintln!("Press Enter to retry.");
            }
            Err(e) => eprintln!("Error: {}", e),
        }
        self.save();
    }

    fn record_tags(&mut self, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        self.profile.record(tags);
        if let Err(e) = self.profile.save(self.users_dir) {
            tracing::warn!("Failed to save user profile: {}", e);
        }
    }

    fn save(&mut self) {
        if let Some(log) = self.log.as_deref_mut() {
            if let Err(e) = log.save_snapshot(&self.chat.snapshot()) {
                tracing::warn!("Failed to save session: {}", e);
            }
        }
    }

    /// Apply a command that changes the session. Returns false to exit.
    async fn apply(&mut self, result: CommandResult) -> bool {
        match result {
            CommandResult::Exit => return false,
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
            CommandResult::EditUser { id, text } => {
                match self.chat.edit_user(id, &text) {
                    Ok(()) => println!("Message updated."),
                    Err(e) => println!("Edit failed: {}", e),
                }
                self.save();
            }
            CommandResult::EditReply { id, text } => {
                match self.chat.edit_reply(id, &text) {
                    Ok(true) => println!("Reply updated."),
                    Ok(false) => println!("Empty text, nothing changed."),
                    Err(e) => println!("Edit failed: {}", e),
                }
                self.save();
            }
            CommandResult::Delete(id) => {
                let removed = self.chat.delete(id);
                println!(
                    "Deleted {} message{}. Press Enter to regenerate.",
                    removed,
                    if removed == 1 { "" } else { "s" }
                );
                self.save();
            }
            CommandResult::Flip { id, step } => {
                match self.chat.flip_version(id, step) {
                    Ok(index) => {
                        let message = self.chat.transcript().get(id);
                        let count = message.map(|m| m.version_count()).unwrap_or(0);
                        println!("Version {}/{}", index + 1, count);
                        if let Some(version) = message.and_then(|m| m.active_version()) {
                            let name = &self.chat.character().name;
                            println!("{}\n{}: {}", version.narration, name, version.dialogue);
                        }
                    }
                    Err(Error::OutOfRange { len, .. }) => {
                        println!("No more versions (this reply has {}).", len)
                    }
                    Err(e) => println!("Error: {}", e),
                }
                self.save();
            }
            CommandResult::Regenerate { id, instruction } => {
                let receiver = self.chat.subscribe();
                let turn = self.chat.regenerate(id, instruction.as_deref());
                let result = drive(&self.printer, receiver, turn).await;
                self.finish_turn("", result);
            }
            CommandResult::Continue => {
                let receiver = self.chat.subscribe();
                let result = drive(&self.printer, receiver, self.chat.continue_reply()).await;
                self.finish_turn("", result);
            }
        }
        true
    }
}

async fn run_interactive(app: &mut App<'_>) -> anyhow::Result<()> {
    let character = app.chat.character();
    if io::IsTerminal::is_terminal(&io::stderr()) {
        match app.log.as_deref() {
            Some(log) => eprintln!(
                "vnchat ({}) session: {}",
                character.name,
                session::short_id(log.id())
            ),
            None => eprintln!("vnchat ({})", character.name),
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    if app.chat.transcript().is_empty() {
        let hidden = character.hidden_greeting();
        if !hidden.is_empty() {
            println!("{}", hidden);
        }
        println!("{}: {}", character.name, character.visible_greeting());
        println!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim().to_string();

        if let Some(result) = commands::execute_command(&input, app.chat, app.profile) {
            if !app.apply(result).await {
                break;
            }
            println!();
            continue;
        }

        let receiver = app.chat.subscribe();
        let result = drive(&app.printer, receiver, app.chat.submit(&input)).await;
        app.finish_turn(&input, result);
        println!();
    }

    if app.chat.discard_incomplete_reply() {
        app.save();
    }
    Ok(())
}

fn list_sessions() -> anyhow::Result<()> {
    let sessions = SessionLog::list(&SessionLog::sessions_dir())?;

    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }

    println!("Saved sessions:\n");
    for session in sessions {
        println!(
            "  {}  {}  {}/{} ({} messages, {})",
            session.short_id(),
            session.created_at_display(),
            session.ip,
            session.character,
            session.message_count,
            session.model
        );
    }
    println!("\nResume with: vnchat --resume <full-id>");

    Ok(())
}

fn list_characters(library: &CharacterLibrary) -> anyhow::Result<()> {
    let ips = library.ips()?;
    if ips.is_empty() {
        println!("No characters found in {}", library.root().display());
        return Ok(());
    }

    for ip in ips {
        println!("{}:", ip);
        for path in library.characters(&ip)? {
            println!("  {}", path);
        }
    }
    println!("\nStart a chat with: vnchat --ip <ip> --character <path>");
    Ok(())
}

fn create_character(
    library: &CharacterLibrary,
    ip: Option<&str>,
    unit: Option<&str>,
    file: &std::path::Path,
) -> anyhow::Result<()> {
    let Some(ip) = ip else {
        anyhow::bail!("--create-character needs --ip <ip>");
    };
    let content = std::fs::read_to_string(file)?;
    let character: vnchat_core::Character = serde_json::from_str(&content)?;
    let path = library.create(ip, unit, &character)?;
    println!("Created {} at {}/{}", character.name.trim(), ip, path);
    println!("Start a chat with: vnchat --ip {} --character {}", ip, path);
    Ok(())
}

fn show_recommendations(library: &CharacterLibrary, profile: &UserProfile) -> anyhow::Result<()> {
    let characters = library.load_all()?;
    if characters.is_empty() {
        println!("No characters found in {}", library.root().display());
        return Ok(());
    }

    let tags = profile.top_tags(profile::TOP_TAGS);
    let recommendations = recommend::recommend(&tags, &characters, recommend::TOP_N);
    if recommendations.is_empty() {
        println!("No tagged characters to recommend.");
        return Ok(());
    }

    println!("Recommended for {}:\n", profile.username);
    for rec in recommendations {
        println!(
            "  {:.2}  {} ({}/{})",
            rec.score, rec.character.name, rec.character.ip, rec.character.path
        );
    }
    Ok(())
}
