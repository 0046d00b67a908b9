use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pagewatch_client::{FetcherConfig, NotifierConfig, WatchFetcher, build_dispatcher};
use pagewatch_core::models::{
    CheckInterval, ContentMode, FetchConfig, NotifyChannels, RenderMode, Target,
};
use pagewatch_core::notify::ChannelKind;
use pagewatch_core::proxy_pool::ProxyPool;
use pagewatch_core::scheduler::{CheckOutcome, Scheduler};
use pagewatch_core::MemoryStorage;
use pagewatch_core::traits::{Notifier, PageFetcher, Storage};
use pagewatch_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "pagewatch", version, about = "Web page change monitor")]
struct Cli {
    /// Use an in-memory store seeded from a JSON array of targets instead of PostgreSQL
    #[arg(long, global = true, env = "PAGEWATCH_MEMORY_FILE")]
    memory: Option<PathBuf>,

    /// Allow fetching private and loopback addresses
    #[arg(long, global = true, default_value_t = false)]
    allow_private_urls: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule every enabled target and run until Ctrl-C
    Run,

    /// Check a single target now
    Check {
        /// Target ID
        id: Uuid,
    },

    /// Fetch a URL and print the extracted content, without storing anything
    Fetch {
        url: String,

        /// CSS selector (or JSON path with --json) of the monitored area
        #[arg(short, long)]
        selector: Option<String>,

        /// Render with headless Chromium
        #[arg(long, default_value_t = false)]
        browser: bool,

        /// Treat the response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// User-Agent preset (chrome, firefox, safari, mobile, googlebot) or custom string
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Manage monitored targets
    #[command(subcommand)]
    Target(TargetCommand),

    /// Show recorded changes, newest first
    Changes {
        /// Only changes of this target
        id: Option<Uuid>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Send a sample notification through one channel of a target
    NotifyTest {
        /// email, webhook, feishu, serverchan, wecom, telegram or discord
        channel: ChannelKind,

        /// Target whose endpoint is used
        #[arg(short, long)]
        target: Uuid,
    },
}

#[derive(Subcommand)]
enum TargetCommand {
    /// Add a target
    Add(AddTarget),

    /// List all targets
    List,

    /// Remove a target with its snapshots and changes
    Remove { id: Uuid },
}

#[derive(Args)]
struct AddTarget {
    #[arg(short, long)]
    url: String,

    #[arg(short, long)]
    name: String,

    /// 5min, 15min, 30min, 1hour, 6hour or 1day
    #[arg(short, long, default_value = "1hour")]
    interval: CheckInterval,

    #[arg(short, long)]
    selector: Option<String>,

    #[arg(long, default_value_t = false)]
    browser: bool,

    #[arg(long)]
    wait_for_selector: Option<String>,

    #[arg(long, default_value_t = false)]
    json: bool,

    /// Ignore changes that only touch dates, times and counters
    #[arg(long, default_value_t = false)]
    ignore_noise: bool,

    #[arg(long)]
    proxy: Option<String>,

    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    webhook: Option<String>,

    #[arg(long)]
    telegram: Option<String>,

    #[arg(long)]
    discord: Option<String>,

    #[arg(long)]
    feishu: Option<String>,

    #[arg(long)]
    wecom: Option<String>,

    #[arg(long)]
    serverchan: Option<String>,
}

impl AddTarget {
    fn into_target(self) -> Target {
        let mut target = Target::new(self.url, self.name).with_interval(self.interval);
        target.selector = self.selector;
        target.wait_for_selector = self.wait_for_selector;
        target.ignore_noise = self.ignore_noise;
        target.proxy = self.proxy;
        if self.browser {
            target.render_mode = RenderMode::Browser;
        }
        if self.json {
            target.fetch_config = Some(FetchConfig {
                content_mode: ContentMode::Json,
                ..Default::default()
            });
        }
        target.notify = NotifyChannels {
            email: self.email,
            webhook: self.webhook,
            telegram: self.telegram,
            discord: self.discord,
            feishu: self.feishu,
            wecom: self.wecom,
            serverchan: self.serverchan,
        };
        target
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pagewatch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fetcher = build_fetcher(cli.allow_private_urls)?;

    if let Commands::Fetch {
        url,
        selector,
        browser,
        json,
        user_agent,
    } = cli.command
    {
        let result = cmd_fetch(&fetcher, url, selector, browser, json, user_agent).await;
        fetcher.browser().shutdown().await;
        return result;
    }

    let result = match &cli.memory {
        Some(path) => {
            let storage = load_memory_storage(path)?;
            execute(cli.command, fetcher.clone(), storage, true).await
        }
        None => execute(cli.command, fetcher.clone(), connect_db().await?, false).await,
    };
    fetcher.browser().shutdown().await;
    result
}

fn build_fetcher(allow_private_urls: bool) -> Result<WatchFetcher> {
    let mut config = FetcherConfig::from_env().context("Invalid fetcher configuration")?;
    if allow_private_urls {
        config = config.allow_private_urls();
    }
    let proxies = ProxyPool::from_env();
    if proxies.size() > 0 {
        tracing::info!(proxies = proxies.size(), "Proxy pool loaded");
    }
    WatchFetcher::new(config, proxies).context("Failed to create HTTP client")
}

async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

fn load_memory_storage(path: &Path) -> Result<MemoryStorage> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets file: {}", path.display()))?;
    let targets: Vec<Target> =
        serde_json::from_str(&raw).context("Invalid JSON in targets file")?;
    tracing::info!(targets = targets.len(), "Loaded targets into memory store");
    Ok(MemoryStorage::with_targets(targets))
}

async fn execute<S: Storage>(
    command: Commands,
    fetcher: WatchFetcher,
    storage: S,
    in_memory: bool,
) -> Result<()> {
    match command {
        Commands::Run => {
            let notifier = build_dispatcher(NotifierConfig::from_env()?)?;
            cmd_run(Scheduler::new(fetcher, storage, notifier)).await
        }
        Commands::Check { id } => {
            let notifier = build_dispatcher(NotifierConfig::from_env()?)?;
            cmd_check(Scheduler::new(fetcher, storage, notifier), id).await
        }
        Commands::Target(TargetCommand::Add(args)) => {
            reject_in_memory(in_memory, "target add")?;
            let target = args.into_target();
            storage.create_target(&target).await?;
            println!("Added target {} ({})", target.id, target.name);
            Ok(())
        }
        Commands::Target(TargetCommand::List) => cmd_list_targets(&storage).await,
        Commands::Target(TargetCommand::Remove { id }) => {
            reject_in_memory(in_memory, "target remove")?;
            if storage.delete_target(id).await? {
                println!("Removed target {id}");
            } else {
                println!("No target with id {id}");
            }
            Ok(())
        }
        Commands::Changes { id, limit } => cmd_changes(&storage, id, limit).await,
        Commands::NotifyTest { channel, target } => {
            let target = storage
                .get_target(target)
                .await?
                .with_context(|| format!("No target with id {target}"))?;
            let dispatcher = build_dispatcher(NotifierConfig::from_env()?)?;
            dispatcher.send_test(channel, &target).await?;
            println!("Test notification sent via {channel}");
            Ok(())
        }
        Commands::Fetch { .. } => bail!("`fetch` does not use a store"),
    }
}

fn reject_in_memory(in_memory: bool, command: &str) -> Result<()> {
    if in_memory {
        bail!("`{command}` changes would be lost with --memory; edit the targets file instead");
    }
    Ok(())
}

async fn cmd_run<F, S, N>(scheduler: Scheduler<F, S, N>) -> Result<()>
where
    F: PageFetcher,
    S: Storage,
    N: Notifier,
{
    let scheduled = scheduler.start().await?;
    if scheduled == 0 {
        tracing::warn!("No enabled targets; waiting anyway");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    scheduler.stop();
    Ok(())
}

async fn cmd_check<F, S, N>(scheduler: Scheduler<F, S, N>, id: Uuid) -> Result<()>
where
    F: PageFetcher,
    S: Storage,
    N: Notifier,
{
    match scheduler.check_target(id).await {
        CheckOutcome::Missing => bail!("No target with id {id}"),
        CheckOutcome::Disabled => println!("Target {id} is disabled"),
        CheckOutcome::Skipped => println!("A check of {id} is already running"),
        CheckOutcome::Baseline { snapshot_id } => {
            println!("Baseline snapshot stored ({snapshot_id})")
        }
        CheckOutcome::Unchanged { .. } => println!("No change"),
        CheckOutcome::Insignificant { summary, .. } => {
            println!("Minor change ignored: {summary}")
        }
        CheckOutcome::Changed { change, report } => {
            println!("[{}] {}", change.importance, change.summary);
            println!("{}", change.diff_text());
            if !report.sent.is_empty() {
                println!("Notified: {}", join_channels(&report.sent));
            }
            if !report.failed.is_empty() {
                println!("Failed: {}", join_channels(&report.failed));
            }
        }
        CheckOutcome::Failed { error } => bail!("Check failed: {error}"),
    }
    Ok(())
}

fn join_channels(channels: &[ChannelKind]) -> String {
    channels
        .iter()
        .map(ChannelKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn cmd_fetch(
    fetcher: &WatchFetcher,
    url: String,
    selector: Option<String>,
    browser: bool,
    json: bool,
    user_agent: Option<String>,
) -> Result<()> {
    let mut target = Target::new(url, "preview");
    target.selector = selector;
    if browser {
        target.render_mode = RenderMode::Browser;
    }
    target.fetch_config = Some(FetchConfig {
        user_agent,
        content_mode: if json { ContentMode::Json } else { ContentMode::Html },
        ..Default::default()
    });

    tracing::info!(url = %target.url, "Fetching");
    let page = fetcher.fetch(&target).await?;

    tracing::info!(
        status = page.status_code,
        elapsed_ms = page.response_time_ms,
        chars = page.content.len(),
        "Fetched"
    );
    if !page.title.is_empty() {
        println!("# {}\n", page.title);
    }
    println!("{}", page.content);
    Ok(())
}

async fn cmd_list_targets<S: Storage>(storage: &S) -> Result<()> {
    let targets = storage.list_targets().await?;
    if targets.is_empty() {
        println!("No targets");
        return Ok(());
    }

    for target in &targets {
        let last_checked = target
            .last_checked_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {} {} [{}{}] {} (last checked: {})",
            target.id,
            target.name,
            target.check_interval,
            if target.enabled { "" } else { ", disabled" },
            target.url,
            last_checked,
        );
    }
    println!("\nTotal: {} targets", targets.len());
    Ok(())
}

async fn cmd_changes<S: Storage>(storage: &S, id: Option<Uuid>, limit: usize) -> Result<()> {
    let changes = storage.list_changes(id, limit).await?;
    if changes.is_empty() {
        println!("No changes recorded");
        return Ok(());
    }

    for change in &changes {
        println!(
            "  [{}] {} {} {}{}",
            change.importance,
            change.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
            change.target_id,
            change.summary,
            if change.notified { "" } else { " (not notified)" },
        );
    }
    println!("\nTotal: {} changes", changes.len());
    Ok(())
}
