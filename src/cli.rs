//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use asset_bundler::registry::ResourceKind;

/// Bundle or download the assets listed by a page scan.
///
/// Reads a JSON asset list (`[{"url": ..., "type": "image"}, ...]`), lets you
/// pick resources by URL or kind, and either saves them one by one or packs
/// them into a single zip archive.
#[derive(Parser, Debug)]
#[command(name = "asset-bundler")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON config file (defaults to the per-user config if present)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resources in an asset list
    List(ListArgs),
    /// Save each selected resource as its own file
    Download(TransferArgs),
    /// Pack selected resources into one zip archive
    Bundle(TransferArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Asset list produced by discovery
    #[arg(short, long, value_name = "FILE")]
    pub assets: PathBuf,

    /// Only list resources of this kind
    #[arg(short, long, value_parser = parse_kind)]
    pub kind: Option<ResourceKind>,
}

#[derive(clap::Args, Debug)]
pub struct TransferArgs {
    /// Asset list produced by discovery
    #[arg(short, long, value_name = "FILE")]
    pub assets: PathBuf,

    /// Select this URL (repeatable). Without --select or --kind, everything is selected
    #[arg(short, long = "select", value_name = "URL")]
    pub select: Vec<String>,

    /// Select every resource of this kind
    #[arg(short, long, value_parser = parse_kind)]
    pub kind: Option<ResourceKind>,

    /// Directory files are saved under
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Folder inside the output directory (default: assets)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Worker count for this command (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Ask for a save location instead of using the derived filename
    #[arg(long)]
    pub prompt_for_location: bool,
}

fn parse_kind(value: &str) -> Result<ResourceKind, String> {
    value.parse()
}
