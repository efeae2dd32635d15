use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cairn", about = "Content-addressed directory snapshots", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory from the configuration
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Capture a directory as a named snapshot
    Snapshot(SnapshotArgs),
    /// List snapshot names
    List,
    /// List a directory inside a snapshot
    Ls(LsArgs),
    /// Print a file from a snapshot
    Cat(CatArgs),
    /// Show a snapshot's root key
    Show(ShowArgs),
}

#[derive(Args)]
pub struct SnapshotArgs {
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct LsArgs {
    pub name: String,
    #[arg(default_value = "")]
    pub path: String,
}

#[derive(Args)]
pub struct CatArgs {
    pub name: String,
    pub path: String,
}

#[derive(Args)]
pub struct ShowArgs {
    pub name: String,
}
