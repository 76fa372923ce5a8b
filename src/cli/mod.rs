//! Command-line interface for herald.
//!
//! Runs the agent, schedules and publishes posts, and lets an operator
//! moderate candidates from the terminal.

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use clap::{Parser, Subcommand};
use fs2::FileExt;
use tracing::info;

use crate::adapters::{
    ActionButton, ChannelBroadcaster, HttpImageFetcher, OperatorChat, OperatorNotifier,
    TelegramClient,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{Agent, AgentParts, AgentSettings, Outcome};
use crate::domain::{parse_target_time, Decision, SessionId};
use crate::operator::telegram::{known_chats, UpdatePoller};
use crate::operator::{acknowledge, OperatorBridge};
use crate::sources::{ContentSource, FeedSource, TemplateSource};
use crate::store::{SqliteStore, Store};

/// Session used for decisions made from the terminal when no admin chat is set
const CONSOLE_SESSION: SessionId = SessionId(0);

/// herald - channel publishing agent with human moderation
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent: scheduler, periodic discovery and the moderation bot
    Run,

    /// Schedule a post for later delivery
    Schedule {
        /// Message text
        text: String,

        /// Delivery time (RFC 3339 or "YYYY-MM-DD HH:MM" local time)
        #[arg(long)]
        at: String,

        /// Image URL or file path
        #[arg(long)]
        image: Option<String>,
    },

    /// Publish a post to the channel right now
    Publish {
        /// Message text
        text: String,

        /// Image URL or file path
        #[arg(long)]
        image: Option<String>,
    },

    /// List scheduled posts that are not yet published
    Pending,

    /// List recently discovered candidates
    Candidates {
        /// Maximum number of candidates to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run discovery once and send previews for moderation
    Discover {
        /// Maximum number of new candidates
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// Approve, reject or start editing a candidate
    Decide {
        /// Candidate ID
        id: i64,

        /// approve, reject or edit
        decision: Decision,
    },

    /// Replace a candidate's text
    Edit {
        /// Candidate ID
        id: i64,

        /// New text
        text: String,
    },

    /// Print the chats that recently wrote to the bot
    ChatIds,

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run => run_agent().await,
            Commands::Schedule { text, at, image } => schedule(&text, &at, image).await,
            Commands::Publish { text, image } => publish(&text, image).await,
            Commands::Pending => list_pending().await,
            Commands::Candidates { limit } => list_candidates(limit).await,
            Commands::Discover { max } => discover(max).await,
            Commands::Decide { id, decision } => decide(id, decision).await,
            Commands::Edit { id, text } => edit(id, &text).await,
            Commands::ChatIds => chat_ids().await,
            Commands::Config => show_config().await,
        }
    }
}

/// Prints previews to the terminal when no admin chat is configured
struct ConsoleNotifier;

#[async_trait]
impl OperatorNotifier for ConsoleNotifier {
    async fn present(&self, text: &str, actions: &[ActionButton]) -> Result<()> {
        println!("{}", text);
        let labels: Vec<_> = actions
            .iter()
            .map(|a| format!("{} [{}]", a.label, a.callback_data))
            .collect();
        println!("  {}", labels.join("  "));
        println!();
        Ok(())
    }

    async fn notify(&self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }
}

fn open_store(cfg: &ResolvedConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&cfg.db_path)
        .with_context(|| format!("Failed to open database: {}", cfg.db_path.display()))?
        .with_timeout(cfg.limits.store_timeout());
    Ok(Arc::new(store))
}

fn build_sources(cfg: &ResolvedConfig) -> Result<Vec<Arc<dyn ContentSource>>> {
    let mut sources: Vec<Arc<dyn ContentSource>> = Vec::new();
    if cfg.discovery.templates {
        sources.push(Arc::new(TemplateSource::new()));
    }
    if !cfg.discovery.feeds.is_empty() {
        sources.push(Arc::new(FeedSource::new(
            cfg.discovery.feeds.clone(),
            cfg.limits.source_timeout(),
        )?));
    }
    Ok(sources)
}

/// Build the agent from configuration. Fails without bot token and channel.
fn build_agent(cfg: &ResolvedConfig) -> Result<(Arc<Agent>, Arc<TelegramClient>)> {
    let telegram = cfg.telegram()?;
    let client = Arc::new(TelegramClient::new(
        telegram.bot_token.clone(),
        cfg.limits.send_timeout(),
    )?);

    let notifier: Arc<dyn OperatorNotifier> = match telegram.admin_chat_id {
        Some(chat) => Arc::new(OperatorChat::new(client.clone(), chat)),
        None => Arc::new(ConsoleNotifier),
    };

    let parts = AgentParts {
        store: open_store(cfg)?,
        broadcaster: Arc::new(ChannelBroadcaster::new(client.clone(), telegram.channel_id)),
        images: Arc::new(HttpImageFetcher::new(cfg.limits.image_timeout())?),
        notifier,
        sources: build_sources(cfg)?,
    };

    let settings = AgentSettings {
        scheduler_interval: cfg.scheduler_interval(),
        discovery: cfg.discovery.clone(),
        dedup: cfg.dedup.clone(),
        limits: cfg.limits.clone(),
    };

    Ok((Arc::new(Agent::new(parts, settings)), client))
}

fn console_session(cfg: &ResolvedConfig) -> SessionId {
    cfg.admin_chat_id.map(SessionId).unwrap_or(CONSOLE_SESSION)
}

/// Exclusive lock so only one agent polls the bot and writes the database
fn acquire_lock(cfg: &ResolvedConfig) -> Result<File> {
    std::fs::create_dir_all(&cfg.home)
        .with_context(|| format!("Failed to create home directory: {}", cfg.home.display()))?;

    let path = cfg.lock_path();
    let file = File::create(&path)
        .with_context(|| format!("Failed to create lock file: {}", path.display()))?;
    file.try_lock_exclusive()
        .with_context(|| format!("Another herald instance is running (lock: {})", path.display()))?;

    Ok(file)
}

/// Run all loops until Ctrl+C
async fn run_agent() -> Result<()> {
    let cfg = config::config()?;
    let admin = cfg.admin_chat()?;
    let _lock = acquire_lock(cfg)?;

    let (agent, client) = build_agent(cfg)?;
    let bridge = Arc::new(OperatorBridge::new(agent.clone(), SessionId(admin)));
    let poller = UpdatePoller::new(client, bridge);

    info!(
        db = %cfg.db_path.display(),
        channel = cfg.channel_id.as_deref().unwrap_or_default(),
        "Starting herald"
    );

    let ctx = agent.context();
    let operator = tokio::spawn(async move { poller.run(ctx).await });

    agent.run().await?;
    operator.await.context("Operator poller panicked")?;

    Ok(())
}

async fn schedule(text: &str, at: &str, image: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let target = parse_target_time(at)?;
    let (agent, _) = build_agent(cfg)?;

    let post = agent.schedule_create(text, image, target).await?;

    println!(
        "🕐 Post #{} scheduled for {}",
        post.id,
        post.target_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

async fn publish(text: &str, image: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let (agent, _) = build_agent(cfg)?;

    let receipt = agent.publish_now(text, image).await?;

    println!("✅ Published (message {})", receipt.message_id);
    if let Some(reason) = receipt.image_skipped {
        println!("   Image skipped: {}", reason);
    }
    Ok(())
}

async fn list_pending() -> Result<()> {
    let cfg = config::config()?;
    let store = open_store(cfg)?;
    let posts = store.list_pending().await?;

    if posts.is_empty() {
        println!("No pending posts.");
        return Ok(());
    }

    println!("{:<6} {:<17} {:<6} TEXT", "ID", "TARGET", "IMAGE");
    println!("{}", "-".repeat(72));
    for post in posts {
        let preview: String = post.text.chars().take(40).collect();
        println!(
            "{:<6} {:<17} {:<6} {}",
            post.id,
            post.target_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            if post.image.is_some() { "yes" } else { "-" },
            preview.replace('\n', " ")
        );
    }

    Ok(())
}

async fn list_candidates(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let store = open_store(cfg)?;
    let candidates = store.list_recent_candidates(limit).await?;

    if candidates.is_empty() {
        println!("No candidates found.");
        return Ok(());
    }

    println!("{:<6} {:<20} {:<18} {:<17} TITLE", "ID", "STATE", "CATEGORY", "FOUND");
    println!("{}", "-".repeat(90));
    for c in candidates {
        println!(
            "{:<6} {:<20} {:<18} {:<17} {}",
            c.id,
            c.stored_state().to_string(),
            c.category,
            c.found_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            c.title
        );
    }

    Ok(())
}

async fn discover(max: Option<usize>) -> Result<()> {
    let cfg = config::config()?;
    let (agent, _) = build_agent(cfg)?;

    agent.seed_index().await?;
    let found = agent
        .discover(max.unwrap_or(cfg.discovery.max_candidates))
        .await;

    println!("🔍 {} new candidate(s)", found.len());
    for candidate in &found {
        println!("  #{} {}", candidate.id, candidate.title);
    }
    Ok(())
}

async fn decide(id: i64, decision: Decision) -> Result<()> {
    let cfg = config::config()?;
    let (agent, _) = build_agent(cfg)?;

    let result = agent.decide(id, decision, console_session(cfg)).await;
    println!("{}", acknowledge(id, &result).message);

    if let Ok(Outcome::Editing { .. }) = result {
        println!("\nUse `herald edit {} <text>` to replace the text.", id);
    }

    result.map(|_| ()).map_err(Into::into)
}

async fn edit(id: i64, text: &str) -> Result<()> {
    let cfg = config::config()?;
    let (agent, _) = build_agent(cfg)?;

    // Edit markers live in memory, so open the edit in this process
    agent.decide(id, Decision::Edit, console_session(cfg)).await?;
    let result = agent.submit_edited_text(id, text).await;
    println!("{}", acknowledge(id, &result).message);

    result.map(|_| ()).map_err(Into::into)
}

/// Print chat ids from recent updates (for HERALD_CHANNEL_ID / HERALD_ADMIN_CHAT_ID)
async fn chat_ids() -> Result<()> {
    let cfg = config::config()?;
    let token = cfg
        .bot_token
        .clone()
        .ok_or(config::ConfigError::MissingBotToken)?;
    let client = TelegramClient::new(token, Duration::from_secs(30))?;

    let updates = client.get_updates(0, 0).await?;
    let chats = known_chats(&updates);

    if chats.is_empty() {
        println!("No chats found. Send a message to the bot (or post in the channel) and retry.");
        return Ok(());
    }

    for chat in chats {
        println!("{:<16} {:<10} {}", chat.id, chat.kind, chat.name);
    }
    Ok(())
}

async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  Herald Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.db_path.display());
    println!();
    println!("Telegram:");
    println!("  Bot token:  {}", if cfg.bot_token.is_some() { "(set)" } else { "(missing)" });
    println!("  Channel:    {}", cfg.channel_id.as_deref().unwrap_or("(missing)"));
    println!("  Admin chat: {}", cfg.admin_chat_id.map(|id| id.to_string()).unwrap_or_else(|| "(missing)".to_string()));
    println!();
    println!("Scheduler:");
    println!("  Interval: {}s", cfg.scheduler_interval_seconds);
    println!();
    println!("Discovery:");
    println!("  Interval:       {}s", cfg.discovery.interval_seconds);
    println!("  Max candidates: {}", cfg.discovery.max_candidates);
    println!("  Attempt budget: {}", cfg.discovery.attempt_budget);
    println!("  Preview pacing: {}ms", cfg.discovery.preview_pacing_ms);
    println!("  Templates:      {}", cfg.discovery.templates);
    println!("  Feeds:          {}", cfg.discovery.feeds.len());
    println!();
    println!("Dedup:");
    println!("  Fingerprint prefix: {} chars", cfg.dedup.body_prefix_chars);
    println!("  Similarity prefix:  {} chars", cfg.dedup.similarity_prefix_chars);
    println!("  Match titles:       {}", cfg.dedup.match_titles);
    println!();
    println!("Limits:");
    println!("  Store:  {}s", cfg.limits.store_timeout_seconds);
    println!("  Image:  {}s", cfg.limits.image_timeout_seconds);
    println!("  Send:   {}s", cfg.limits.send_timeout_seconds);
    println!("  Source: {}s", cfg.limits.source_timeout_seconds);

    Ok(())
}
