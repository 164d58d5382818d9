//! CLI command definitions, routing, and tracing setup.

use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use youmind_auth::{AuthStore, login_wait};
use youmind_browser::WebDriverFactory;
use youmind_discovery::{
    DiscoveryMode, DiscoveryOptions, MaterialOutcome, add_material, discover, fallback_facts,
};
use youmind_library::{AddOptions, BoardLibrary, NewBoard, ResolvedTarget};
use youmind_query::{EngineConfig, QueryRequest, QueryResult, execute};
use youmind_shared::{
    AppConfig, AuthArtifact, BoardId, BoardTarget, init_config, library_path, load_config,
};

/// Bounded retry for transient UI faults during `ask`. The engine itself
/// never retries.
const ASK_ATTEMPTS: u32 = 2;

/// Backoff between ask attempts.
const ASK_BACKOFF: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// YouMind — board chat from the terminal.
#[derive(Parser)]
#[command(
    name = "youmind",
    version,
    about = "Ask YouMind boards questions, keep a local board library, and auto-discover board metadata.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Authentication state management.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Local board library management.
    Board {
        #[command(subcommand)]
        action: BoardAction,
    },

    /// Ask a question against a board.
    Ask {
        /// The question to ask.
        question: String,

        /// Board ID from the local library.
        #[arg(long, conflicts_with = "board_url")]
        board_id: Option<String>,

        /// Explicit board URL, bypassing the library.
        #[arg(long)]
        board_url: Option<String>,

        /// Per-question deadline override in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Show the browser window for debugging.
        #[arg(long)]
        show_browser: bool,

        /// Keep a material focus embedded in the board URL.
        #[arg(long)]
        keep_material_context: bool,
    },

    /// Ask a board to ingest material.
    Material {
        #[command(subcommand)]
        action: MaterialAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Auth subcommands.
#[derive(Subcommand)]
pub(crate) enum AuthAction {
    /// Report the persisted session state (absent / unvalidated / valid).
    Status,
    /// Probe whether the persisted session still works.
    Validate,
    /// Open a visible browser and wait for an interactive login.
    Setup,
    /// Discard the current session and log in again.
    Reauth,
    /// Delete the persisted session state.
    Clear,
}

/// Board library subcommands.
#[derive(Subcommand)]
pub(crate) enum BoardAction {
    /// Add a board with explicit metadata.
    Add {
        /// Board chat URL.
        #[arg(long)]
        url: String,

        /// Human-readable name.
        #[arg(long)]
        name: String,

        /// Short description.
        #[arg(long, default_value = "")]
        description: String,

        /// Comma-separated topic keywords.
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,

        /// Skip the duplicate-URL guard.
        #[arg(long)]
        allow_duplicate: bool,

        /// Make this board active.
        #[arg(long)]
        activate: bool,
    },

    /// Add a board, discovering its metadata from its own answers.
    SmartAdd {
        /// Board chat URL.
        #[arg(long)]
        url: String,

        /// Discovery passes: 1 (cheap) or 2 (better fields). Defaults from config.
        #[arg(long)]
        passes: Option<u8>,

        /// Override the discovered name.
        #[arg(long)]
        name: Option<String>,

        /// Skip the duplicate-URL guard.
        #[arg(long)]
        allow_duplicate: bool,

        /// Make this board active.
        #[arg(long)]
        activate: bool,

        /// Show the browser window for debugging.
        #[arg(long)]
        show_browser: bool,
    },

    /// List all boards.
    List,

    /// Search boards by name, description, or topic.
    Search {
        /// Substring to look for (case-insensitive).
        query: String,
    },

    /// Make a board the default query target.
    Activate {
        /// Board ID.
        #[arg(long)]
        id: String,
    },

    /// Remove a board from the library.
    Remove {
        /// Board ID.
        #[arg(long)]
        id: String,
    },

    /// Show library counts.
    Stats,
}

/// Material subcommands.
#[derive(Subcommand)]
pub(crate) enum MaterialAction {
    /// Ask a board to add a material URL.
    Add {
        /// Material URL to ingest.
        #[arg(long)]
        url: String,

        /// Board ID from the local library.
        #[arg(long, conflicts_with = "board_url")]
        board_id: Option<String>,

        /// Explicit board URL, bypassing the library.
        #[arg(long)]
        board_url: Option<String>,

        /// Re-ask once when the reply is ambiguous.
        #[arg(long)]
        confirm: bool,

        /// Show the browser window for debugging.
        #[arg(long)]
        show_browser: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "youmind=info",
        1 => "youmind=debug",
        _ => "youmind=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Auth { action } => match action {
            AuthAction::Status => cmd_auth_status().await,
            AuthAction::Validate => cmd_auth_validate().await,
            AuthAction::Setup => cmd_auth_setup(false).await,
            AuthAction::Reauth => cmd_auth_setup(true).await,
            AuthAction::Clear => cmd_auth_clear().await,
        },
        Command::Board { action } => match action {
            BoardAction::Add {
                url,
                name,
                description,
                topics,
                allow_duplicate,
                activate,
            } => cmd_board_add(&url, &name, &description, topics, allow_duplicate, activate).await,
            BoardAction::SmartAdd {
                url,
                passes,
                name,
                allow_duplicate,
                activate,
                show_browser,
            } => {
                cmd_board_smart_add(
                    &url,
                    passes,
                    name.as_deref(),
                    allow_duplicate,
                    activate,
                    show_browser,
                )
                .await
            }
            BoardAction::List => cmd_board_list().await,
            BoardAction::Search { query } => cmd_board_search(&query).await,
            BoardAction::Activate { id } => cmd_board_activate(&id).await,
            BoardAction::Remove { id } => cmd_board_remove(&id).await,
            BoardAction::Stats => cmd_board_stats().await,
        },
        Command::Ask {
            question,
            board_id,
            board_url,
            timeout_secs,
            show_browser,
            keep_material_context,
        } => {
            cmd_ask(
                &question,
                board_id.as_deref(),
                board_url.as_deref(),
                timeout_secs,
                show_browser,
                keep_material_context,
            )
            .await
        }
        Command::Material { action } => match action {
            MaterialAction::Add {
                url,
                board_id,
                board_url,
                confirm,
                show_browser,
            } => {
                cmd_material_add(
                    &url,
                    board_id.as_deref(),
                    board_url.as_deref(),
                    confirm,
                    show_browser,
                )
                .await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

fn open_library() -> Result<BoardLibrary> {
    Ok(BoardLibrary::open(library_path()?)?)
}

fn build_factory(config: &AppConfig) -> Result<WebDriverFactory> {
    let home = Url::parse(&config.service.base_url)
        .map_err(|e| eyre!("invalid service base_url: {e}"))?;
    Ok(WebDriverFactory::new(&config.webdriver, home)?)
}

fn load_artifact(config: &AppConfig) -> Result<Option<AuthArtifact>> {
    Ok(AuthStore::new(config)?.load()?)
}

/// Resolve the board a command should target: explicit URL > library id >
/// the library's active pointer.
fn resolve_board(
    library: &BoardLibrary,
    board_id: Option<&str>,
    board_url: Option<&str>,
    config: &AppConfig,
) -> Result<ResolvedTarget> {
    let target = match (board_url, board_id) {
        (Some(url), _) => {
            let url = Url::parse(url).map_err(|e| eyre!("invalid board URL '{url}': {e}"))?;
            let prefix = config.service.board_url_prefix()?;
            if !url.as_str().starts_with(prefix.as_str()) {
                warn!(%url, expected_prefix = %prefix, "board URL does not look like a board");
            }
            BoardTarget::Url(url)
        }
        (None, Some(id)) => BoardTarget::Id(parse_board_id(id)?),
        (None, None) => BoardTarget::Active,
    };

    match library.resolve_target(&target) {
        Ok(resolved) => {
            if let Some(id) = resolved.record_id {
                if let Some(record) = library.get(id) {
                    info!(board = %record.name, "using board");
                }
            }
            Ok(resolved)
        }
        Err(e) => {
            // No usable target — print the library so the user can pick one.
            if matches!(target, BoardTarget::Active) {
                print_board_guidance(library);
            }
            Err(e.into())
        }
    }
}

fn parse_board_id(id: &str) -> Result<BoardId> {
    id.parse::<BoardId>()
        .map_err(|e| eyre!("invalid board id '{id}': {e}"))
}

fn print_board_guidance(library: &BoardLibrary) {
    let boards: Vec<_> = library.list().collect();
    if boards.is_empty() {
        println!("No boards in library. Add one first:");
        println!("  youmind board add --url URL --name NAME");
        return;
    }

    println!("Available boards:");
    let active = library.get_active().map(|b| b.id);
    for board in boards {
        let mark = if Some(board.id) == active {
            "  [ACTIVE]"
        } else {
            ""
        };
        println!("  {}  {}{mark}", board.id, board.name);
    }
    println!();
    println!("Pick one with --board-id, or set a default:");
    println!("  youmind board activate --id ID");
}

// ---------------------------------------------------------------------------
// CLI progress spinner
// ---------------------------------------------------------------------------

/// Spinner shown while a browser transaction runs.
struct CliSpinner {
    spinner: ProgressBar,
}

impl CliSpinner {
    fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message(message.to_string());
        Self { spinner }
    }

    fn update(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    fn finish(self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Auth commands
// ---------------------------------------------------------------------------

async fn cmd_auth_status() -> Result<()> {
    let config = load_config()?;
    let store = AuthStore::new(&config)?;
    let status = store.status().await?;
    println!("Auth status: {status}");
    Ok(())
}

async fn cmd_auth_validate() -> Result<()> {
    let config = load_config()?;
    let store = AuthStore::new(&config)?;

    if store.validate().await? {
        println!("Authentication is valid.");
        Ok(())
    } else {
        Err(eyre!(
            "authentication is no longer valid — run `youmind auth reauth`"
        ))
    }
}

async fn cmd_auth_setup(reauth: bool) -> Result<()> {
    let config = load_config()?;
    let store = AuthStore::new(&config)?;
    let factory = build_factory(&config)?;
    let wait = login_wait(&config);

    println!("A browser window will open on the sign-in page.");
    println!(
        "Complete the login there; waiting up to {} minutes.",
        wait.as_secs() / 60
    );

    let artifact = if reauth {
        store.reauth(&factory, wait).await?
    } else {
        store.setup(&factory, wait).await?
    };

    println!();
    println!("  Login captured.");
    println!("  Cookies: {}", artifact.cookies.len());
    Ok(())
}

async fn cmd_auth_clear() -> Result<()> {
    let config = load_config()?;
    AuthStore::new(&config)?.clear()?;
    println!("Auth state cleared.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Board commands
// ---------------------------------------------------------------------------

async fn cmd_board_add(
    url: &str,
    name: &str,
    description: &str,
    topics: Vec<String>,
    allow_duplicate: bool,
    activate: bool,
) -> Result<()> {
    let mut library = open_library()?;

    let record = library.add(
        NewBoard {
            url: url.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            topics,
        },
        AddOptions {
            allow_duplicate_url: allow_duplicate,
            activate,
        },
    )?;

    println!();
    println!("  Board added.");
    println!("  ID:     {}", record.id);
    println!("  Name:   {}", record.name);
    println!("  URL:    {}", record.url);
    Ok(())
}

async fn cmd_board_smart_add(
    url: &str,
    passes: Option<u8>,
    name_override: Option<&str>,
    allow_duplicate: bool,
    activate: bool,
    show_browser: bool,
) -> Result<()> {
    let config = load_config()?;
    let board_url = Url::parse(url).map_err(|e| eyre!("invalid board URL '{url}': {e}"))?;

    let factory = build_factory(&config)?;
    let artifact = load_artifact(&config)?;
    let engine = EngineConfig::from_app(&config);
    let mode = DiscoveryMode::from_passes(passes.unwrap_or(config.discovery.passes));
    let opts = DiscoveryOptions {
        visible: show_browser,
        timeout: None,
    };

    let spinner = CliSpinner::new("Discovering board metadata…");
    let report = discover(&factory, artifact.as_ref(), &board_url, mode, &opts, &engine).await;
    spinner.finish();
    let report = report?;

    let facts = report
        .structured
        .clone()
        .unwrap_or_else(|| fallback_facts(&report.summary_text));

    let mut library = open_library()?;
    let record = library.add(
        NewBoard {
            url: board_url.to_string(),
            name: name_override.unwrap_or(&facts.name).to_string(),
            description: facts.description,
            topics: facts.topics,
        },
        AddOptions {
            allow_duplicate_url: allow_duplicate,
            activate,
        },
    )?;

    println!();
    println!("  Board discovered and added.");
    println!("  ID:          {}", record.id);
    println!("  Name:        {}", record.name);
    println!("  Description: {}", record.description);
    println!("  Topics:      {}", record.topics.join(", "));
    println!("  Passes:      {}", report.passes_used);
    println!(
        "  Structured:  {}",
        if report.structured.is_some() {
            "yes"
        } else {
            "no (fell back to free text)"
        }
    );
    Ok(())
}

async fn cmd_board_list() -> Result<()> {
    let library = open_library()?;
    let boards: Vec<_> = library.list().collect();

    if boards.is_empty() {
        println!("No boards in library.");
        return Ok(());
    }

    let active = library.get_active().map(|b| b.id);
    for board in boards {
        let mark = if Some(board.id) == active {
            " [ACTIVE]"
        } else {
            ""
        };
        println!("{}  {}{mark}", board.id, board.name);
        if !board.description.is_empty() {
            println!("    {}", board.description);
        }
        if !board.topics.is_empty() {
            println!("    topics: {}", board.topics.join(", "));
        }
    }
    Ok(())
}

async fn cmd_board_search(query: &str) -> Result<()> {
    let library = open_library()?;
    let matches = library.search(query);

    if matches.is_empty() {
        println!("No boards match '{query}'.");
        return Ok(());
    }

    for board in matches {
        println!("{}  {}", board.id, board.name);
    }
    Ok(())
}

async fn cmd_board_activate(id: &str) -> Result<()> {
    let mut library = open_library()?;
    let id = parse_board_id(id)?;
    library.activate(id)?;

    let name = library.get(id).map(|b| b.name.clone()).unwrap_or_default();
    println!("Active board: {name}");
    Ok(())
}

async fn cmd_board_remove(id: &str) -> Result<()> {
    let mut library = open_library()?;
    let removed = library.remove(parse_board_id(id)?)?;
    println!("Removed board '{}'.", removed.name);
    Ok(())
}

async fn cmd_board_stats() -> Result<()> {
    let library = open_library()?;
    let stats = library.stats();

    println!("  Boards:        {}", stats.boards);
    println!("  Topics:        {}", stats.distinct_topics);
    println!(
        "  Active:        {}",
        stats.active_name.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Last used:     {}",
        stats.most_recently_used.as_deref().unwrap_or("(never)")
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Ask
// ---------------------------------------------------------------------------

async fn cmd_ask(
    question: &str,
    board_id: Option<&str>,
    board_url: Option<&str>,
    timeout_secs: Option<u64>,
    show_browser: bool,
    keep_material_context: bool,
) -> Result<()> {
    let config = load_config()?;
    let mut library = open_library()?;
    let resolved = resolve_board(&library, board_id, board_url, &config)?;

    let factory = build_factory(&config)?;
    let artifact = load_artifact(&config)?;
    let engine = EngineConfig::from_app(&config);

    let mut request = QueryRequest::new(question, resolved.url.clone());
    request.options.visible = show_browser;
    request.options.timeout = timeout_secs.map(Duration::from_secs);
    request.options.keep_material_context =
        keep_material_context || config.discovery.keep_material_context;

    let spinner = CliSpinner::new("Asking board…");

    // UI-layer faults are typically transient; retry once with backoff.
    // Timeouts are not retried — the user chooses whether to re-ask longer.
    let mut outcome = None;
    for attempt in 1..=ASK_ATTEMPTS {
        let result = execute(&factory, artifact.as_ref(), &request, &engine).await;
        match result {
            Ok(o) => match &o.result {
                QueryResult::Failed { reason } if attempt < ASK_ATTEMPTS => {
                    warn!(%reason, attempt, "transaction failed; retrying");
                    spinner.update("Retrying…");
                    tokio::time::sleep(ASK_BACKOFF).await;
                }
                _ => {
                    outcome = Some(o);
                    break;
                }
            },
            Err(e) => {
                spinner.finish();
                return Err(e.into());
            }
        }
    }
    spinner.finish();

    let outcome = outcome.expect("at least one attempt ran");
    match outcome.result {
        QueryResult::Answered { text } => {
            if let Some(id) = resolved.record_id {
                library.touch(id)?;
            }

            println!();
            println!("Question: {question}");
            println!();
            println!("{text}");
            println!();
            println!("  ({:.1}s)", outcome.elapsed.as_secs_f64());
            Ok(())
        }
        QueryResult::TimedOut => {
            let waited = timeout_secs.unwrap_or(config.timeouts.query_timeout_secs);
            Err(eyre!(
                "no answer within {waited}s — re-ask with --timeout-secs {} for slow boards",
                waited * 2
            ))
        }
        QueryResult::Failed { reason } => Err(eyre!("{reason}")),
    }
}

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

async fn cmd_material_add(
    url: &str,
    board_id: Option<&str>,
    board_url: Option<&str>,
    confirm: bool,
    show_browser: bool,
) -> Result<()> {
    let config = load_config()?;
    let library = open_library()?;
    let resolved = resolve_board(&library, board_id, board_url, &config)?;

    let material_url = Url::parse(url).map_err(|e| eyre!("invalid material URL '{url}': {e}"))?;

    let factory = build_factory(&config)?;
    let artifact = load_artifact(&config)?;
    let engine = EngineConfig::from_app(&config);
    let opts = DiscoveryOptions {
        visible: show_browser,
        timeout: None,
    };

    let spinner = CliSpinner::new("Adding material…");
    let mut outcome = add_material(
        &factory,
        artifact.as_ref(),
        &resolved.url,
        &material_url,
        &opts,
        &engine,
    )
    .await;

    // Ambiguous replies can be re-asked once; the flow itself never retries.
    if confirm {
        if let Ok(MaterialOutcome::Ambiguous { .. }) = &outcome {
            spinner.update("Reply was ambiguous; asking again to confirm…");
            outcome = add_material(
                &factory,
                artifact.as_ref(),
                &resolved.url,
                &material_url,
                &opts,
                &engine,
            )
            .await;
        }
    }
    spinner.finish();

    match outcome? {
        MaterialOutcome::Added { answer } => {
            println!();
            println!("  Material added.");
            println!("  Board reply: {answer}");
            Ok(())
        }
        MaterialOutcome::Ambiguous { answer } => {
            println!();
            println!("  Could not confirm the material was added.");
            println!("  Board reply: {answer}");
            println!();
            println!("  Re-run with --confirm to ask again, or check the board manually.");
            Err(eyre!("material-add outcome is ambiguous"))
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{rendered}");
    Ok(())
}
