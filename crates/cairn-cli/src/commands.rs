use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use cairn_cas::FileChunkStore;
use cairn_catalog::SledCatalog;
use cairn_fs::{DiskTree, SnapshotDir};
use cairn_snap::{EntryInfo, Node, NodeKind};
use cairn_types::Interrupt;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use crate::cli::*;
use crate::config::CairnConfig;

pub fn run_command(cli: Cli, config: CairnConfig) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    // A signal ends the process outright; an abandoned capture leaves only
    // unreferenced chunks.
    execute(cli, config, &Interrupt::never(), &mut out)
}

fn execute(
    cli: Cli,
    mut config: CairnConfig,
    intr: &Interrupt,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let snapshots = open_snapshots(&config)?;
    let format = cli.format;
    match cli.command {
        Command::Snapshot(args) => cmd_snapshot(&snapshots, args, format, intr, out),
        Command::List => cmd_list(&snapshots, format, intr, out),
        Command::Ls(args) => cmd_ls(&snapshots, args, format, intr, out),
        Command::Cat(args) => cmd_cat(&snapshots, args, intr, out),
        Command::Show(args) => cmd_show(&snapshots, args, format, intr, out),
    }
}

fn open_snapshots(config: &CairnConfig) -> anyhow::Result<SnapshotDir> {
    let chunks = config.data_dir.join("chunks");
    let catalog = config.data_dir.join("catalog");
    debug!(chunks = %chunks.display(), catalog = %catalog.display(), "opening storage");
    let store = FileChunkStore::open(&chunks)
        .with_context(|| format!("opening chunk store {}", chunks.display()))?;
    let catalog = SledCatalog::open(&catalog)
        .with_context(|| format!("opening catalog {}", catalog.display()))?;
    SnapshotDir::init(Arc::new(store), Arc::new(catalog), config.blob_config())
        .context("opening snapshot directory")
}

#[derive(Serialize)]
struct EntryOut<'a> {
    name: &'a str,
    kind: &'static str,
    size: u64,
}

impl<'a> From<&'a EntryInfo> for EntryOut<'a> {
    fn from(e: &'a EntryInfo) -> Self {
        Self {
            name: &e.name,
            kind: kind_name(e.kind),
            size: e.size,
        }
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    name: &'a str,
    key: String,
    entries: u64,
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Dir => "dir",
        NodeKind::File => "file",
    }
}

fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn cmd_snapshot(
    snapshots: &SnapshotDir,
    args: SnapshotArgs,
    format: OutputFormat,
    intr: &Interrupt,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let tree = DiskTree::new(&args.dir);
    let root = snapshots
        .create_by_name(&args.name, &tree, intr)
        .with_context(|| format!("capturing {} as {}", args.dir.display(), args.name))?;
    let summary = SnapshotOut {
        name: root.name(),
        key: root.key().to_hex(),
        entries: root.attr().size,
    };
    match format {
        OutputFormat::Json => print_json(out, &summary)?,
        OutputFormat::Text => writeln!(
            out,
            "{} Captured {} ({} entries) {}",
            "✓".green().bold(),
            summary.name.bold(),
            summary.entries,
            root.key().short_hex().yellow()
        )?,
    }
    Ok(())
}

fn cmd_list(
    snapshots: &SnapshotDir,
    format: OutputFormat,
    intr: &Interrupt,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let names = snapshots.list_names(intr)?;
    match format {
        OutputFormat::Json => print_json(out, &names)?,
        OutputFormat::Text if names.is_empty() => writeln!(out, "No snapshots.")?,
        OutputFormat::Text => {
            for name in &names {
                writeln!(out, "{}", name.blue().bold())?;
            }
        }
    }
    Ok(())
}

fn cmd_ls(
    snapshots: &SnapshotDir,
    args: LsArgs,
    format: OutputFormat,
    intr: &Interrupt,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let root = snapshots.lookup_by_name(&args.name, intr)?;
    let node = root
        .walk(&args.path, intr)
        .with_context(|| format!("{}:{}", args.name, args.path))?;
    let entries = match &node {
        Node::Dir(dir) => dir.list(intr)?,
        Node::File(file) => vec![EntryInfo {
            name: file.name().to_string(),
            kind: NodeKind::File,
            size: file.size(),
        }],
    };
    match format {
        OutputFormat::Json => {
            let rows: Vec<EntryOut<'_>> = entries.iter().map(EntryOut::from).collect();
            print_json(out, &rows)?;
        }
        OutputFormat::Text => {
            for e in &entries {
                let (tag, name) = match e.kind {
                    NodeKind::Dir => ("d", e.name.blue().bold()),
                    NodeKind::File => ("-", e.name.normal()),
                };
                writeln!(out, "{tag} {:>10} {name}", e.size)?;
            }
        }
    }
    Ok(())
}

fn cmd_cat(
    snapshots: &SnapshotDir,
    args: CatArgs,
    intr: &Interrupt,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let root = snapshots.lookup_by_name(&args.name, intr)?;
    let node = root
        .walk(&args.path, intr)
        .with_context(|| format!("{}:{}", args.name, args.path))?;
    let Some(file) = node.as_file() else {
        bail!("{}:{} is a directory", args.name, args.path);
    };
    out.write_all(&file.read_all(intr)?)?;
    Ok(())
}

fn cmd_show(
    snapshots: &SnapshotDir,
    args: ShowArgs,
    format: OutputFormat,
    intr: &Interrupt,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let root = snapshots.lookup_by_name(&args.name, intr)?;
    let summary = SnapshotOut {
        name: root.name(),
        key: root.key().to_hex(),
        entries: root.attr().size,
    };
    match format {
        OutputFormat::Json => print_json(out, &summary)?,
        OutputFormat::Text => {
            writeln!(out, "Snapshot {}", summary.name.bold())?;
            writeln!(out, "  Root:    {}", summary.key.yellow())?;
            writeln!(out, "  Entries: {}", summary.entries)?;
        }
    }
    Ok(())
}
