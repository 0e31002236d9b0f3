use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use bytestore_core::{fsck, ConsistencyReport, ContainerId, ContainerIndex};
use bytestore_server::{BytestoreServer, ServerConfig};
use colored::Colorize;
use tracing::{debug, info, warn};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.root)?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Fsck(args) => cmd_fsck(&config.root, args, &cli.format),
        Command::Ls(args) => cmd_ls(&config.root, args, &cli.format),
    }
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(root) = root {
        config.root = root;
    }
    Ok(config)
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(addr) = args.api_addr {
        config.api_addr = addr;
    }
    if let Some(addr) = args.public_addr {
        config.public_addr = addr;
    }
    if let Some(limit) = args.list_limit {
        config.list_limit = limit;
    }

    let index = ContainerIndex::open(&config.root).with_context(|| {
        format!("cannot build a trustworthy index from {}", config.root.display())
    })?;
    println!(
        "{} Index ready: {} containers under {}",
        "✓".green().bold(),
        index.len().to_string().bold(),
        config.root.display()
    );

    info!(
        api = %config.api_addr,
        public = %config.public_addr,
        list_limit = config.list_limit,
        "starting server"
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(BytestoreServer::new(config, Arc::new(index)).serve())?;
    Ok(())
}

fn cmd_fsck(root: &Path, args: FsckArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let report = fsck::check(root)
        .with_context(|| format!("consistency check of {} failed", root.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    if !report.is_clean() {
        warn!(issues = report.issue_count(), root = %root.display(), "store has inconsistencies");
    }
    if args.prune {
        let removed = fsck::prune(&report)?;
        println!("{} Pruned {} file(s).", "✓".green(), removed);
    }

    if !report.corrupt_sidecars.is_empty() {
        bail!(
            "{} corrupt sidecar(s) will prevent the server from starting",
            report.corrupt_sidecars.len()
        );
    }
    if !args.prune && report.prunable().next().is_some() {
        bail!("{} issue(s) found; rerun with --prune to clean up", report.issue_count());
    }
    Ok(())
}

fn print_report(report: &ConsistencyReport) {
    println!(
        "Checked {} containers, {} objects.",
        report.containers.to_string().bold(),
        report.objects.to_string().bold()
    );
    if report.is_clean() {
        println!("{} No issues.", "✓".green().bold());
        return;
    }
    for path in &report.orphan_payloads {
        println!("  {} {}", "orphan payload:".yellow(), path.display());
    }
    for path in &report.orphan_sidecars {
        println!("  {} {}", "orphan sidecar:".yellow(), path.display());
    }
    for (path, reason) in &report.corrupt_sidecars {
        println!("  {} {} ({})", "corrupt sidecar:".red(), path.display(), reason);
    }
    for path in &report.temp_files {
        println!("  {} {}", "temp file:".yellow(), path.display());
    }
    for path in &report.stray_entries {
        println!("  {} {}", "unrecognized:".dimmed(), path.display());
    }
}

fn cmd_ls(root: &Path, args: LsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    // Read-only: a mistyped root must not be created.
    let index = ContainerIndex::new(root);
    index
        .rebuild_from_disk()
        .with_context(|| format!("cannot read store at {}", root.display()))?;
    debug!(containers = index.len(), "index loaded");

    let Some(raw) = args.container else {
        let ids = index.list(args.limit);
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
            OutputFormat::Text => {
                for id in ids {
                    let count = index.get(&id).map(|c| c.len()).unwrap_or(0);
                    println!("{}  {} objects", id.to_string().cyan(), count);
                }
            }
        }
        return Ok(());
    };

    let id = ContainerId::parse(&raw)?;
    let Some(container) = index.get(&id) else {
        bail!("container not found: {id}");
    };
    let metas: Vec<_> = container
        .list(args.limit)
        .iter()
        .filter_map(|object| container.get(object))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&metas)?),
        OutputFormat::Text => {
            for meta in metas {
                println!(
                    "{}  {}  {}  {}",
                    meta.id.to_string().yellow(),
                    meta.created_at.to_rfc3339().dimmed(),
                    meta.name.bold(),
                    meta.tag
                );
            }
        }
    }
    Ok(())
}
