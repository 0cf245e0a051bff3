//! CLI entry point for the asset bundler.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use asset_bundler::{
    ArchiveDelivery, BundleReport, Bundler, BundlerConfig, Dispatcher, FileTransport, Registry,
    ResourceKind, SelectionSet, TransferCoordinator, TransferState, truncate_url,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::{Args, Command, ListArgs, TransferArgs};

/// Width URLs are shortened to in printed reports.
const URL_DISPLAY_WIDTH: usize = 80;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    debug!(?args, "CLI arguments parsed");

    let base_config = load_config(args.config.as_deref())?;

    match &args.command {
        Command::List(list) => run_list(list),
        Command::Download(transfer) => run_download(&base_config, transfer, args.quiet).await,
        Command::Bundle(transfer) => run_bundle(&base_config, transfer, args.quiet).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<BundlerConfig> {
    let config = match path {
        Some(path) => BundlerConfig::load(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => BundlerConfig::load_default()
            .context("Failed to load default config file")?
            .unwrap_or_default(),
    };
    debug!(?config, "configuration resolved");
    Ok(config)
}

fn run_list(args: &ListArgs) -> Result<ExitCode> {
    let registry = load_registry(&args.assets)?;
    let mut shown = 0usize;
    for descriptor in registry
        .iter()
        .filter(|d| args.kind.is_none_or(|kind| d.kind == kind))
    {
        let dimensions = match (descriptor.width, descriptor.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<10} {:>11}  {}",
            descriptor.kind.as_str(),
            dimensions,
            truncate_url(&descriptor.url, URL_DISPLAY_WIDTH)
        );
        shown += 1;
    }
    info!(shown, total = registry.len(), "listed resources");
    Ok(ExitCode::SUCCESS)
}

async fn run_download(base: &BundlerConfig, args: &TransferArgs, quiet: bool) -> Result<ExitCode> {
    let mut config = apply_overrides(base, args);
    if let Some(concurrency) = args.concurrency {
        config.direct_concurrency = usize::from(concurrency);
    }
    config.validate()?;

    let registry = load_registry(&args.assets)?;
    let keys = select_keys(&registry, args);
    if keys.is_empty() {
        info!("Nothing selected");
        return Ok(ExitCode::SUCCESS);
    }

    let client = config.http_client()?;
    let (coordinator, events) = TransferCoordinator::new();
    let coordinator = Arc::new(coordinator);
    let transport = Arc::new(FileTransport::new(&args.output_dir, client, events));

    let (progress_handle, stop) = progress::spawn_progress_ui(
        show_progress(quiet),
        "download",
        coordinator.subscribe(),
    );

    let dispatcher = Dispatcher::new(transport)
        .with_namespace(config.namespace.clone())
        .with_concurrency(config.direct_concurrency)
        .with_prompt_for_location(config.prompt_for_location);
    dispatcher.dispatch(&keys, &coordinator).await;
    drop(dispatcher);
    coordinator.run_until_settled().await;

    progress::stop_progress_ui(progress_handle, &stop).await;

    let snapshot = coordinator.progress();
    println!(
        "Downloaded {} of {} resources into {}",
        snapshot.done,
        snapshot.selected,
        args.output_dir.join(&config.namespace).display()
    );
    Ok(report_failures(&coordinator))
}

async fn run_bundle(base: &BundlerConfig, args: &TransferArgs, quiet: bool) -> Result<ExitCode> {
    let mut config = apply_overrides(base, args);
    if let Some(concurrency) = args.concurrency {
        config.fetch_concurrency = usize::from(concurrency);
    }
    config.validate()?;

    let registry = load_registry(&args.assets)?;
    let keys = select_keys(&registry, args);
    if keys.is_empty() {
        info!("Nothing selected");
        return Ok(ExitCode::SUCCESS);
    }

    let client = config.http_client()?;
    let (coordinator, events) = TransferCoordinator::new();
    let coordinator = Arc::new(coordinator);
    let transport = Arc::new(FileTransport::new(&args.output_dir, client.clone(), events));

    let (progress_handle, stop) = progress::spawn_progress_ui(
        show_progress(quiet),
        "bundle",
        coordinator.subscribe(),
    );

    let bundler = Bundler::new(&config, client, transport);
    let report = bundler.bundle(&keys, &coordinator).await;
    drop(bundler);
    coordinator.run_until_settled().await;

    progress::stop_progress_ui(progress_handle, &stop).await;

    let archive_ok = report_archive(&report, &coordinator, &args.output_dir)?;
    println!(
        "{} entries, {} skipped, {} failed",
        report.entries,
        report.skipped.len(),
        report.failed.len()
    );
    for url in &report.skipped {
        println!("  skipped (streaming manifest): {}", truncate_url(url, URL_DISPLAY_WIDTH));
    }

    let status = report_failures(&coordinator);
    if archive_ok {
        Ok(status)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn apply_overrides(base: &BundlerConfig, args: &TransferArgs) -> BundlerConfig {
    let mut config = base.clone();
    if let Some(namespace) = &args.namespace {
        config.namespace.clone_from(namespace);
    }
    if args.prompt_for_location {
        config.prompt_for_location = true;
    }
    config
}

fn load_registry(path: &Path) -> Result<Registry> {
    let registry = Registry::load(path)
        .with_context(|| format!("Failed to read asset list '{}'", path.display()))?;
    info!(resources = registry.len(), "asset list loaded");
    Ok(registry)
}

/// Builds the selection: every resource when nothing was asked for, else the
/// requested kind followed by the explicitly selected URLs.
fn select_keys(registry: &Registry, args: &TransferArgs) -> Vec<String> {
    let mut selection = SelectionSet::new();
    match args.kind {
        Some(kind) => selection.select_kind(registry, kind),
        None if args.select.is_empty() => selection.select_all(registry),
        None => {}
    }
    for url in &args.select {
        selection.select(url.clone());
    }
    let keys = registry.resolve_selection(&selection);
    info!(
        selected = keys.len(),
        kind = args.kind.map_or("any", |k: ResourceKind| k.as_str()),
        "selection resolved"
    );
    keys
}

fn show_progress(quiet: bool) -> bool {
    progress::should_show_progress(io::stderr().is_terminal(), quiet, progress::is_dumb_terminal())
}

/// Prints the archive outcome. Returns `false` if the archive was lost.
fn report_archive(
    report: &BundleReport,
    coordinator: &TransferCoordinator,
    output_dir: &Path,
) -> Result<bool> {
    match &report.archive {
        ArchiveDelivery::Empty => {
            println!("No archive written: nothing could be fetched");
            Ok(true)
        }
        ArchiveDelivery::Submitted { filename, .. } => {
            let record = coordinator.record(filename);
            match record.as_ref().map(|r| r.state) {
                Some(TransferState::Done) => {
                    println!(
                        "Archive saved: {} ({} bytes)",
                        output_dir.join(filename).display(),
                        report.archive_len
                    );
                    Ok(true)
                }
                _ => {
                    let reason = record
                        .and_then(|r| r.failure_reason)
                        .unwrap_or_else(|| "transfer did not finish".to_string());
                    println!("Archive {filename} failed: {reason}");
                    Ok(false)
                }
            }
        }
        ArchiveDelivery::Unsaved {
            filename,
            bytes,
            reason,
        } => {
            let fallback = unsaved_archive_path(filename);
            std::fs::write(&fallback, bytes).with_context(|| {
                format!("Failed to write unsaved archive to '{}'", fallback.display())
            })?;
            warn!(reason = reason.as_str(), "archive refused by transport");
            println!(
                "Archive refused ({reason}); saved manually to {}",
                fallback.display()
            );
            Ok(true)
        }
    }
}

fn unsaved_archive_path(filename: &str) -> PathBuf {
    let name = Path::new(filename)
        .file_name()
        .map_or_else(|| PathBuf::from("Assets.zip"), PathBuf::from);
    std::env::temp_dir().join(name)
}

/// Prints failed transfers and maps them to an exit status.
fn report_failures(coordinator: &TransferCoordinator) -> ExitCode {
    let failures = coordinator.failures();
    if failures.is_empty() {
        return ExitCode::SUCCESS;
    }
    println!("{} failed:", failures.len());
    for record in &failures {
        println!(
            "  {} [{}] {}",
            truncate_url(&record.key, URL_DISPLAY_WIDTH),
            record
                .failure_kind
                .map_or("unknown", |kind| kind.as_str()),
            record.failure_reason.as_deref().unwrap_or("")
        );
    }
    ExitCode::FAILURE
}
