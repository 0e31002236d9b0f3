use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bytestore",
    about = "Bytestore: filesystem-backed object storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Rebuild the index from disk and start the HTTP server
    Serve(ServeArgs),
    /// Check the store for orphaned, corrupt, or unrecognized files
    Fsck(FsckArgs),
    /// List containers, or the objects of one container
    Ls(LsArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub api_addr: Option<SocketAddr>,
    #[arg(long)]
    pub public_addr: Option<SocketAddr>,
    #[arg(long)]
    pub list_limit: Option<usize>,
}

#[derive(Args)]
pub struct FsckArgs {
    /// Delete orphan payloads, orphan sidecars, and leftover temp files
    #[arg(long)]
    pub prune: bool,
}

#[derive(Args)]
pub struct LsArgs {
    pub container: Option<String>,
    #[arg(short = 'n', long, default_value = "300")]
    pub limit: usize,
}
