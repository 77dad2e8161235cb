use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chatdesk::config::{ChatClientConfig, ClientVariant, ConfigError};
use chatdesk::controller::{ChatController, ClientEvent};
use chatdesk::error::ClientError;
use chatdesk::net::{Backend, HttpBackend};
use chatdesk::runtime::{ChatRuntime, HostEffect};
use chatdesk::state::selector::{Notice, SelectorError, SelectorState};
use chatdesk::state::transcript::{EntryId, EntryKind, MessageEntry};
use chatdesk::util::share_url::LaunchParams;
use chatdesk::util::storage::FileStorage;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use wire::FeedbackKind;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("{0}")]
    Selector(#[from] SelectorError),
    #[error("stdin read failed: {0}")]
    Stdin(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chatdesk", about = "Terminal client for the document chatbot backend")]
struct Cli {
    /// Backend API base; overrides `CHATDESK_API_BASE`.
    #[arg(long)]
    api_base: Option<String>,

    /// Page URL share links point at; overrides `CHATDESK_PAGE_URL`.
    #[arg(long)]
    page_url: Option<String>,

    /// File holding the selected chatbot between runs.
    #[arg(long, env = "CHATDESK_STORE", default_value = ".chatdesk/selected.json")]
    store: PathBuf,

    /// Log verbosity on stderr (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend is reachable.
    Health,
    Bots(BotsCommand),
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
struct BotsCommand {
    #[command(subcommand)]
    command: BotsSubcommand,
}

#[derive(Subcommand, Debug)]
enum BotsSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        system_prompt: String,
    },
    /// Remember a chatbot for `chat` and print its chat link.
    Select {
        chatbot_id: i64,
    },
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// A share link to open, e.g. `https://host/index.html?chatbot=3&session=...`.
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    chatbot: Option<String>,

    #[arg(long)]
    session: Option<String>,

    /// `page`, `widget` or `widget-support`; overrides `CHATDESK_VARIANT`.
    #[arg(long)]
    variant: Option<String>,

    /// Print rendered HTML instead of raw message text.
    #[arg(long, default_value_t = false)]
    html: bool,

    /// Name sent with `/support` requests.
    #[arg(long)]
    name: Option<String>,

    /// Email sent with `/support` requests.
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ChatClientConfig::from_env()?;
    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.trim_end_matches('/').to_owned();
    }
    if let Some(page_url) = &cli.page_url {
        config.page_url.clone_from(page_url);
    }
    let storage = Arc::new(FileStorage::new(&cli.store));

    match cli.command {
        Command::Health => run_health(&config).await,
        Command::Bots(bots) => run_bots(&config, &storage, bots).await,
        Command::Chat(args) => run_chat(config, storage, args).await,
    }
}

async fn run_health(config: &ChatClientConfig) -> Result<(), CliError> {
    let backend = HttpBackend::from_config(config)?;
    if let Err(e) = backend.health().await {
        if e.retryable() {
            eprintln!("{} is not answering; try again shortly", backend.api_base());
        }
        return Err(e.into());
    }
    println!("{} ok", backend.api_base());
    Ok(())
}

// =============================================================================
// SELECTOR
// =============================================================================

async fn run_bots(config: &ChatClientConfig, storage: &FileStorage, bots: BotsCommand) -> Result<(), CliError> {
    let backend = HttpBackend::from_config(config)?;
    let mut selector = SelectorState::new();
    match bots.command {
        BotsSubcommand::List => {
            selector.load(&backend).await?;
            if selector.cards().is_empty() {
                println!("No chatbots yet. Create one with `chatdesk bots create`.");
            }
            for card in selector.cards() {
                let state = if card.chatbot.is_active { "active" } else { "inactive" };
                println!(
                    "{}\t{}\t{state}\t{} documents\t{} sessions",
                    card.chatbot.id, card.chatbot.name, card.document_count, card.session_count
                );
                if let Some(description) = card.chatbot.description.as_deref().filter(|d| !d.is_empty()) {
                    println!("\t{description}");
                }
            }
        }
        BotsSubcommand::Create { name, description, system_prompt } => {
            let result = selector.create(&backend, &name, &description, &system_prompt).await;
            print_notice(selector.notice());
            let created = result?;
            println!("id: {}", created.id);
        }
        BotsSubcommand::Select { chatbot_id } => {
            selector.load(&backend).await?;
            let url = selector.select(chatbot_id, storage, &config.page_url)?;
            println!("{url}");
        }
    }
    Ok(())
}

fn print_notice(notice: Option<&Notice>) {
    match notice {
        Some(Notice::Success(text)) => println!("{text}"),
        Some(Notice::Error(text)) => eprintln!("{text}"),
        None => {}
    }
}

// =============================================================================
// CHAT
// =============================================================================

const HELP: &str = "commands: /support <message>, /up <id>, /down <id>, /suggest <n>, /share, /new, /quit";

enum Input {
    Event(ClientEvent),
    Share,
    Help,
    Quit,
    Invalid(String),
}

async fn run_chat(config: ChatClientConfig, storage: Arc<FileStorage>, args: ChatArgs) -> Result<(), CliError> {
    let config = match args.variant.as_deref() {
        Some(raw) => config.with_variant(ClientVariant::parse(raw)?),
        None => config,
    };
    let mut launch = match args.url.as_deref() {
        Some(url) => LaunchParams::from_url(url)?,
        None => LaunchParams::default(),
    };
    if args.chatbot.is_some() {
        launch.chatbot = args.chatbot;
    }
    if args.session.is_some() {
        launch.session = args.session;
    }

    let backend = Arc::new(HttpBackend::from_config(&config)?);
    let mut runtime = ChatRuntime::new(backend, storage, config, launch);
    let mut view = View { html: args.html, ..View::default() };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    runtime.start();
    println!("{HELP}");
    loop {
        view.render(runtime.controller());
        for effect in runtime.drain_effects() {
            match effect {
                HostEffect::ShareUrl(url) => println!("share link: {url}"),
                HostEffect::Redirect(target) => {
                    println!("No usable chatbot. Pick one with `chatdesk bots select <id>` ({target}).");
                    return Ok(());
                }
            }
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line, args.name.as_deref(), args.email.as_deref()) {
                    Input::Event(event) => runtime.submit(event),
                    Input::Share => match runtime.controller().share_url() {
                        Some(url) => println!("{url}"),
                        None => println!("No session available to share"),
                    },
                    Input::Help => println!("{HELP}"),
                    Input::Quit => break,
                    Input::Invalid(reason) => println!("{reason}"),
                }
            }
            alive = runtime.step() => {
                if !alive {
                    break;
                }
            }
        }
    }
    runtime.shutdown();
    Ok(())
}

fn parse_input(line: &str, name: Option<&str>, email: Option<&str>) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Event(ClientEvent::UserSent(line.to_owned()));
    };
    let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match verb {
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        "share" => Input::Share,
        "new" => Input::Event(ClientEvent::StartNewSession),
        "support" => Input::Event(ClientEvent::SupportRequested {
            message: rest.to_owned(),
            user_name: name.map(str::to_owned),
            user_email: email.map(str::to_owned),
        }),
        "up" | "down" => match rest.parse::<i64>() {
            Ok(message_id) => {
                let kind = if verb == "up" { FeedbackKind::ThumbsUp } else { FeedbackKind::ThumbsDown };
                Input::Event(ClientEvent::FeedbackSelected { message_id, kind })
            }
            Err(_) => Input::Invalid(format!("usage: /{verb} <message id>")),
        },
        "suggest" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Input::Event(ClientEvent::SuggestionChosen(n - 1)),
            _ => Input::Invalid("usage: /suggest <number>".to_owned()),
        },
        other => Input::Invalid(format!("unknown command /{other}; {HELP}")),
    }
}

/// What has already been printed, so each render only prints changes.
#[derive(Default)]
struct View {
    html: bool,
    revision: u64,
    title: String,
    status: String,
    seen: HashSet<EntryId>,
    suggestions_shown: bool,
    typing: bool,
}

impl View {
    fn render(&mut self, controller: &ChatController) {
        let title = controller.title();
        if title != self.title {
            println!("== {title} ==");
            self.title = title;
        }

        let transcript = controller.transcript();
        if transcript.revision() != self.revision {
            self.revision = transcript.revision();
            if transcript.entries().len() < self.seen.len() {
                self.seen.clear();
            }
            for entry in transcript.entries() {
                if self.seen.insert(entry.id) {
                    self.print_entry(entry);
                }
            }

            let suggestions = transcript.visible_suggestions();
            if !suggestions.is_empty() && !self.suggestions_shown {
                println!("suggested questions:");
                for (n, question) in suggestions.iter().enumerate() {
                    println!("  {}. {}", n + 1, question.question_text);
                }
            }
            self.suggestions_shown = !suggestions.is_empty();

            let typing = transcript.typing_visible();
            if typing && !self.typing {
                println!("...");
            }
            self.typing = typing;
        }

        if controller.status() != self.status {
            controller.status().clone_into(&mut self.status);
            println!("[{}]", self.status);
        }
    }

    fn print_entry(&self, entry: &MessageEntry) {
        let marker = match entry.kind {
            EntryKind::Normal => "",
            EntryKind::Error => "! ",
            EntryKind::Notice => "* ",
        };
        let body = if self.html { &entry.html } else { &entry.text };
        println!("{marker}{}: {body}", entry.sender.label());
        if let (true, Some(id)) = (entry.feedback_enabled, entry.message_id) {
            println!("  (rate with /up {id} or /down {id})");
        }
        if !entry.sources.is_empty() {
            println!("  sources: {}", entry.sources.join(", "));
        }
    }
}
