use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "edgelog")]
#[command(about = "CDN access log ingestion", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides EDGELOG_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull log objects from the source into day buckets
    Ingest(IngestArgs),
    /// Write stored day buckets out as flat log files
    Export(ExportArgs),
    /// Show per-day record counts
    Stats,
}

#[derive(clap::Args, Debug)]
pub struct IngestArgs {
    /// Key prefix to list (defaults to source.prefix)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Keep source objects after a successful ingest
    #[arg(long)]
    pub keep: bool,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Output root (defaults to export.output_dir)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Also export today's, still growing, bucket
    #[arg(long)]
    pub include_today: bool,
}
