//! `watchlist-import` command line front-end.

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use watchlist_import::api::{HttpWatchlistApi, WatchlistApi};
use watchlist_import::config::ImporterConfig;
use watchlist_import::display::result_row;
use watchlist_import::events::WizardEvent;
use watchlist_import::file_parser::ParseOptions;
use watchlist_import::organizer::AutoOrganizePoller;
use watchlist_import::submitter::{GroupOption, ImportOutcome, CLEAR_EXISTING_PROMPT};
use watchlist_import::validator::ValidationOutcome;
use watchlist_import::wizard::WizardController;

#[derive(Parser)]
#[command(name = "watchlist-import", version, about = "Import stock codes into watchlist groups")]
struct Cli {
    /// Backend origin, e.g. http://127.0.0.1:8888
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate stock codes and import the valid ones
    Import(ImportArgs),
    /// Let the backend regroup and repair the whole watchlist
    Organize,
    /// List existing watchlist groups
    Groups,
    /// Validate a single stock code
    Check {
        code: String,
        #[arg(long)]
        no_translate: bool,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// TXT, CSV, XLSX or XLS file with one code per row
    #[arg(long, conflicts_with = "codes")]
    file: Option<PathBuf>,

    /// Codes separated by commas, semicolons or newlines
    #[arg(long, required_unless_present = "file")]
    codes: Option<String>,

    /// Target group
    #[arg(long, required_unless_present = "auto")]
    group: Option<String>,

    /// Let the backend pick a group per stock
    #[arg(long, conflicts_with = "group")]
    auto: bool,

    #[arg(long)]
    no_translate: bool,

    /// Add to the current watchlist instead of replacing it
    #[arg(long)]
    keep_existing: bool,

    /// Do not ask before clearing the existing watchlist
    #[arg(long, short = 'y')]
    yes: bool,

    /// The file's first row is a header
    #[arg(long)]
    header: bool,

    /// Zero-based column holding the code
    #[arg(long, default_value_t = 0)]
    column: usize,

    /// Market hint passed to validation
    #[arg(long)]
    market: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_warnings) = ImporterConfig::load();
    if let Some(url) = &cli.api_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level)).init();
    for warning in &config_warnings {
        log::warn!("{}", warning);
    }
    log::debug!("Using backend {}", config.base_url);

    let api: Arc<dyn WatchlistApi> = Arc::new(HttpWatchlistApi::new(&config)?);

    match cli.command {
        Command::Import(args) => run_import(api, config, args).await,
        Command::Organize => run_organize(api, &config).await,
        Command::Groups => run_groups(api.as_ref()).await,
        Command::Check { code, no_translate } => {
            let translate = config.translate_names && !no_translate;
            let result = api
                .validate_stock(&code, translate)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            println!("{}", result_row(&result));
            Ok(())
        }
    }
}

fn print_event(event: WizardEvent) {
    match &event {
        WizardEvent::ResultReceived { result } => println!("{}", result_row(result)),
        WizardEvent::ProgressUpdated { processed, total, percent } => {
            eprintln!("[{:>3}%] {}/{}", percent, processed, total);
        }
        WizardEvent::OrganizeProgress { percent, status, hint } if !hint.is_empty() => {
            eprintln!("[{:>3}%] {} ({})", percent, status, hint);
        }
        WizardEvent::OrganizeProgress { percent, status, .. } => {
            eprintln!("[{:>3}%] {}", percent, status);
        }
        other => {
            if let Some(text) = other.status_text() {
                eprintln!("{}", text);
            }
        }
    }
}

fn is_affirmative(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Wait for an answer line or an interrupt, whichever comes first.
/// `None` means interrupted.
async fn answer_or_interrupt<A, I>(answer: A, interrupt: I) -> Option<bool>
where
    A: Future<Output = Option<String>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => None,
        line = answer => Some(line.as_deref().is_some_and(is_affirmative)),
    }
}

/// y/N prompt read on a blocking thread so Ctrl-C still interrupts it.
/// An interrupt exits without importing anything.
async fn ask_yes_no(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }

    let answer = async {
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .ok()
        .and_then(|read| read.ok())
    };
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match answer_or_interrupt(answer, interrupt).await {
        Some(approved) => approved,
        None => {
            eprintln!("\nInterrupted, nothing was imported");
            std::process::exit(130);
        }
    }
}

fn print_groups(groups: &[GroupOption]) {
    if groups.is_empty() {
        println!("No watchlist groups");
        return;
    }
    for group in groups {
        println!("  {}", group.label);
    }
}

async fn run_import(api: Arc<dyn WatchlistApi>, mut config: ImporterConfig, args: ImportArgs) -> Result<()> {
    if args.market.is_some() {
        config.market = args.market.clone();
    }

    let mut wizard = WizardController::new(Arc::clone(&api), &config, Arc::new(print_event));

    if let Some(path) = &args.file {
        let options = ParseOptions { has_header: args.header, code_column: args.column };
        let count = wizard.load_file(path, &options).map_err(|e| anyhow!(e.user_message()))?;
        println!("Loaded {} stock codes from {}", count, path.display());
    } else if let Some(codes) = &args.codes {
        wizard.set_input_text(codes);
    }

    if args.auto {
        wizard.set_auto_categories(true);
    } else if let Some(group) = &args.group {
        wizard.set_group_name(group);
    }
    wizard.set_translate_names(config.translate_names && !args.no_translate);
    wizard.set_clear_existing(!args.keep_existing);

    wizard.start_validation().map_err(|e| anyhow!(e.user_message()))?;

    let interrupt = wizard.cancel_handle().map(|cancel| {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling validation...");
                cancel.cancel();
            }
        })
    });

    let report = wizard.wait_for_validation().await;
    if let Some(listener) = interrupt {
        listener.abort();
    }
    let report = report?;

    println!(
        "\n{} valid, {} invalid of {} stock codes",
        report.valid_count, report.invalid_count, report.total
    );

    match &report.outcome {
        ValidationOutcome::Completed => {}
        ValidationOutcome::Cancelled => {
            if let Err(e) = api.cancel_validation().await {
                log::warn!("Failed to notify backend of cancel: {}", e);
            }
            println!("Validation cancelled, nothing was imported");
            return Ok(());
        }
        ValidationOutcome::Failed(message) => bail!("Validation failed: {}", message),
    }

    wizard.proceed_to_confirm().map_err(|e| anyhow!(e.user_message()))?;

    let session = wizard.session();
    println!("\nReady to import {} stocks", session.valid_count);
    println!("  Group:           {}", session.confirm_group_label());
    println!("  Translate names: {}", if session.translate_names { "yes" } else { "no" });
    println!("  Clear existing:  {}", if session.clear_existing { "yes" } else { "no" });

    let approved = if session.clear_existing && !args.yes {
        ask_yes_no(CLEAR_EXISTING_PROMPT).await
    } else {
        true
    };
    let confirm = move |_: &str| approved;

    match wizard.confirm_import(&confirm).await {
        Ok(ImportOutcome::Imported(summary)) => {
            println!("\n{}", summary.message);
            println!("Watchlist groups:");
            print_groups(&summary.groups);
            Ok(())
        }
        Ok(ImportOutcome::Declined) => {
            println!("Import cancelled, nothing was sent");
            Ok(())
        }
        Err(e) => bail!("Import failed: {}", e.user_message()),
    }
}

async fn run_organize(api: Arc<dyn WatchlistApi>, config: &ImporterConfig) -> Result<()> {
    let poller = AutoOrganizePoller::new(api, config);
    let report = poller
        .run(&print_event)
        .await
        .map_err(|e| anyhow!("Auto-organize failed: {}", e.user_message()))?;

    println!("\n{}", report.message);
    println!("  Groups organized:  {}", report.stats.groups);
    println!("  Stocks verified:   {}", report.stats.stocks);
    println!("  Names translated:  {}", report.stats.translated);
    println!("  Invalid fixed:     {}", report.stats.fixed);
    if let Some(duplicates) = report.stats.duplicates {
        println!("  Duplicates removed: {}", duplicates);
    }
    println!("Watchlist groups:");
    print_groups(&report.groups);
    Ok(())
}

async fn run_groups(api: &dyn WatchlistApi) -> Result<()> {
    let response = api
        .watchlist_groups()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    if !response.success {
        bail!(response.error.unwrap_or_else(|| "Unknown error".to_string()));
    }

    let groups: Vec<GroupOption> = response
        .groups
        .iter()
        .map(|(name, count)| GroupOption::new(name, *count))
        .collect();
    print_groups(&groups);
    Ok(())
}
