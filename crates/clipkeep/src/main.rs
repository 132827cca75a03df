//! `clipkeep` - CLI for the clipboard history
//!
//! This binary runs the capture daemon and exposes the history maintenance
//! operations.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use clipkeep::cache::ItemCache;
use clipkeep::cli::{
    Cli, Command, ConfigCommand, DaemonCommand, ItemCommand, ListCommand, PruneCommand,
    RescanCommand, ThreatsCommand,
};
use clipkeep::monitor::{select_backend, SessionType};
use clipkeep::pipeline::{CaptureEvent, Pipeline};
use clipkeep::security::{SecurityClassifier, ThreatMemory};
use clipkeep::{init_logging, Config, Storage};

const PREVIEW_CHARS: usize = 60;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // `config validate` must run even when the configuration is broken.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        return handle_validate(file.clone().or_else(|| cli.config.clone()));
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Daemon(cmd) => handle_daemon(config, &cmd).await,
        Command::List(cmd) => handle_list(&config, &cmd),
        Command::Pin(ItemCommand { id }) => {
            open_storage(&config)?.pin(id)?;
            println!("Pinned item {id}.");
            Ok(())
        }
        Command::Unpin(ItemCommand { id }) => {
            open_storage(&config)?.unpin(id)?;
            println!("Unpinned item {id}.");
            Ok(())
        }
        Command::Delete(ItemCommand { id }) => {
            if open_storage(&config)?.delete(id)? {
                println!("Deleted item {id}.");
            } else {
                println!("No item with id {id}.");
            }
            Ok(())
        }
        Command::Dedupe => {
            let removed = open_storage(&config)?.deduplicate_existing()?;
            println!("Removed {removed} duplicate item(s).");
            Ok(())
        }
        Command::Prune(cmd) => handle_prune(&config, &cmd),
        Command::Rescan(cmd) => handle_rescan(&config, &cmd),
        Command::Threats(cmd) => handle_threats(&config, cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let path = config.database_path();
    Storage::open(&path, config.storage.max_items)
        .with_context(|| format!("failed to open history at {}", path.display()))
}

fn open_memory(config: &Config) -> Result<ThreatMemory> {
    let path = config.threat_database_path();
    ThreatMemory::open(&path)
        .with_context(|| format!("failed to open threat memory at {}", path.display()))
}

async fn handle_daemon(mut config: Config, cmd: &DaemonCommand) -> Result<()> {
    if let Some(backend) = cmd.backend {
        config.capture.backend = backend.into();
    }

    let storage = Arc::new(open_storage(&config)?);
    let cache = Arc::new(ItemCache::from_config(Arc::clone(&storage), &config.cache));

    let mut pipeline = Pipeline::new(&config, Arc::clone(&storage)).with_cache(cache);
    match open_memory(&config) {
        Ok(memory) => pipeline = pipeline.with_memory(Arc::new(memory)),
        Err(e) => warn!(error = %e, "Threat memory unavailable, notifying for every threat"),
    }

    let backend = select_backend(&config.capture, SessionType::detect()).await;
    let (handle, mut events) = pipeline.start(backend);
    println!(
        "Capturing clipboard with the {} backend. Press Ctrl-C to stop.",
        handle.backend_name()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl-C")?;
                break;
            }
            event = events.next() => match event {
                Some(event) => report_event(&event),
                None => break,
            },
        }
    }

    info!("Stopping");
    handle.shutdown().await;
    Ok(())
}

fn report_event(event: &CaptureEvent) {
    match event {
        CaptureEvent::Text { id, content } => {
            info!(id, len = content.len(), "Captured text");
        }
        CaptureEvent::Image {
            id, description, ..
        } => {
            info!(id, %description, "Captured image");
        }
        CaptureEvent::SecurityThreat { threats, .. } => {
            for threat in threats {
                warn!(
                    threat_type = %threat.threat_type,
                    confidence = threat.confidence,
                    "{}",
                    threat.reason
                );
            }
        }
    }
}

fn handle_list(config: &Config, cmd: &ListCommand) -> Result<()> {
    let items = open_storage(config)?.get_page(cmd.offset, cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("History is empty.");
        return Ok(());
    }
    for item in &items {
        let pin = if item.is_pinned {
            format!("*{}", item.pin_order)
        } else {
            String::new()
        };
        let flag = if item.safe_entry { "" } else { " !" };
        println!(
            "{:>6} {:>3} {:<6} {}{}",
            item.id,
            pin,
            item.threat_level,
            item.preview(PREVIEW_CHARS),
            flag
        );
    }
    Ok(())
}

fn handle_prune(config: &Config, cmd: &PruneCommand) -> Result<()> {
    let (empty, single_char) = cmd.targets();
    let removed = open_storage(config)?.prune_database(empty, single_char)?;
    println!("Pruned {removed} item(s).");
    Ok(())
}

fn handle_rescan(config: &Config, cmd: &RescanCommand) -> Result<()> {
    let report = open_storage(config)?.rescan_security_threats()?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Rescanned {} text item(s)", report.scanned);
    println!();
    println!("            before  after");
    for (label, before, after) in [
        ("none", report.before.none, report.after.none),
        ("low", report.before.low, report.after.low),
        ("medium", report.before.medium, report.after.medium),
        ("high", report.before.high, report.after.high),
    ] {
        println!("  {label:<8} {before:>7} {after:>6}");
    }
    println!();
    println!(
        "Upgraded: {}  Downgraded: {}  Unchanged: {}",
        report.upgraded, report.downgraded, report.unchanged
    );
    Ok(())
}

fn handle_threats(config: &Config, cmd: ThreatsCommand) -> Result<()> {
    let memory = open_memory(config)?;

    match cmd {
        ThreatsCommand::List { threat_type, json } => {
            let records = memory.list_all(threat_type)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No dismissed threats.");
            } else {
                for record in &records {
                    println!(
                        "{}  {:<12} {:.2}  x{:<4} {}",
                        record.hash,
                        record.threat_type,
                        record.confidence,
                        record.occurrence_count,
                        record.last_seen.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        ThreatsCommand::Remove { hash } => {
            if memory.remove(&hash)? {
                println!("Removed {hash}.");
            } else {
                println!("No record for {hash}.");
            }
        }
        ThreatsCommand::Cleanup { days } => {
            let removed =
                memory.cleanup_older_than(Duration::from_secs(days.saturating_mul(24 * 60 * 60)))?;
            println!("Removed {removed} record(s) older than {days} day(s).");
        }
        ThreatsCommand::Stats { json } => {
            let stats = memory.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Dismissed threats: {}", stats.total);
                println!("High confidence:   {}", stats.high_confidence);
                for (threat_type, count) in &stats.by_type {
                    println!("  {threat_type:<12} {count}");
                }
            }
        }
        ThreatsCommand::Dismiss { text } => {
            let threats = SecurityClassifier::new().classify(&text);
            if memory.dismiss(&text, &threats)? {
                println!("Dismissed {} threat(s).", threats.len());
            } else {
                println!("Nothing sensitive found; nothing to dismiss.");
            }
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let stats = open_storage(config)?.stats()?;
    let session = SessionType::detect();

    if json {
        let status = serde_json::json!({
            "session": session.to_string(),
            "backend": config.capture.backend,
            "database_path": config.database_path(),
            "threat_database_path": config.threat_database_path(),
            "history": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("clipkeep status");
        println!("---------------");
        println!("Session:       {session}");
        println!("Database:      {}", config.database_path().display());
        println!(
            "Items:         {} ({} text, {} image)",
            stats.total_items, stats.text_items, stats.image_items
        );
        println!("Pinned:        {}", stats.pinned_items);
        println!("Flagged:       {}", stats.unsafe_items);
        println!("Image bytes:   {}", stats.image_bytes);
        println!("Database size: {} bytes", stats.db_size_bytes);
        if let Some(newest) = stats.newest_item {
            println!("Last capture:  {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!(
                    "  Threat database:    {}",
                    config.threat_database_path().display()
                );
                println!("  Max items:          {}", config.storage.max_items);
                println!();
                println!("[Capture]");
                println!("  Backend:            {:?}", config.capture.backend);
                println!("  Poll interval:      {} ms", config.capture.poll_interval_ms);
                println!(
                    "  Stabilize window:   {} ms",
                    config.capture.stabilize_window_ms
                );
                println!("  Related rule:       {:?}", config.capture.related);
                println!("  Read timeout:       {} ms", config.capture.read_timeout_ms);
                println!();
                println!("[Security]");
                println!("  Enabled:            {}", config.security.enabled);
                println!("  Notify threats:     {}", config.security.notify_threats);
                println!();
                println!("[Cache]");
                println!("  Image capacity:     {}", config.cache.image_capacity);
                println!("  Metadata TTL:       {} s", config.cache.metadata_ttl_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => return handle_validate(file.clone()),
    }
    Ok(())
}

fn handle_validate(file: Option<std::path::PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    Config::load_from(Some(path.clone()))
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    println!("Configuration is valid.");
    Ok(())
}
