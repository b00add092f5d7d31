use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabletop_store::facade::DEFAULT_STORE_NAME;
use tabletop_store::migration::MigrationServices;
use tabletop_store::services::SystemClock;
use tabletop_store::storage::FILE_FIELDS;
use tabletop_store::transfer::{ExportSelection, pack_records};
use tabletop_store::{
    DurabilityMode, ExportSnapshot, ImportOptions, MigrationConfig, Store, StoreOptions,
    default_registry, export, import, open_store_with_report, peek_header,
};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "store-tool")]
#[command(about = "Inspect, upgrade and move data in a tabletop store")]
struct Cli {
    /// Directory holding `<name>.store`
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,
    #[arg(long, global = true, default_value = DEFAULT_STORE_NAME)]
    name: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the committed version and table sizes without upgrading.
    Inspect,
    /// List the registered upgrade steps.
    Steps,
    Upgrade {
        /// Target version; defaults to the stable version.
        #[arg(long, conflicts_with = "latest")]
        to: Option<u32>,
        /// Upgrade through every registered step.
        #[arg(long)]
        latest: bool,
        /// Skip image decoding; thumbnails and token sizes are left out.
        #[arg(long)]
        no_media: bool,
        #[arg(long, default_value_t = 4)]
        max_concurrency: usize,
    },
    Export {
        #[arg(long)]
        out: PathBuf,
        /// Map ids to export, with their session states. Exports everything when no map
        /// or token is named.
        #[arg(long)]
        map: Vec<String>,
        #[arg(long)]
        token: Vec<String>,
    },
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        table: Vec<String>,
    },
    /// Print the header of an export file.
    Header {
        #[arg(long)]
        file: PathBuf,
    },
    /// Dump one record, or a whole table, as JSON.
    Load {
        #[arg(long)]
        table: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        include_files: bool,
        /// Write the table as packed MessagePack instead of printing JSON.
        #[arg(long)]
        packed: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect => inspect(&cli.dir, &cli.name).await,
        Command::Steps => list_steps(),
        Command::Upgrade {
            to,
            latest,
            no_media,
            max_concurrency,
        } => upgrade(&cli.dir, &cli.name, to, latest, no_media, max_concurrency).await,
        Command::Export { out, map, token } => {
            export_store(&cli.dir, &cli.name, &out, map, token).await
        }
        Command::Import { file, table } => import_file(&cli.dir, &cli.name, &file, table).await,
        Command::Header { file } => {
            let bytes = fs::read(&file)
                .await
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let header = peek_header(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&header)?);
            Ok(())
        }
        Command::Load {
            table,
            key,
            include_files,
            packed,
        } => {
            load(
                &cli.dir,
                &cli.name,
                &table,
                key.as_deref(),
                include_files,
                packed.as_deref(),
            )
            .await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("store_tool=info,tabletop_store=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open_committed(dir: &Path, name: &str) -> Result<Store> {
    Store::open_at(dir, name, DurabilityMode::Sync, Arc::new(SystemClock))
        .await
        .with_context(|| format!("Failed to open store '{}' in '{}'", name, dir.display()))
}

async fn inspect(dir: &Path, name: &str) -> Result<()> {
    let store = open_committed(dir, name).await?;
    println!("store:          {}", store.name());
    println!("schema version: {}", store.schema_version());
    println!("committed at:   {}", store.committed_at_unix_ms());
    for table in store.table_names() {
        println!("  {:<8} {:>6} records", table, store.table(&table)?.len());
    }
    Ok(())
}

fn list_steps() -> Result<()> {
    let registry = default_registry()?;
    for step in registry.steps() {
        let marker = if step.version() == registry.stable_version() {
            " (stable)"
        } else {
            ""
        };
        println!(
            "{:>3} {:?} {}{}",
            step.version(),
            step.policy(),
            step.description(),
            marker
        );
    }
    Ok(())
}

async fn upgrade(
    dir: &Path,
    name: &str,
    to: Option<u32>,
    latest: bool,
    no_media: bool,
    max_concurrency: usize,
) -> Result<()> {
    let mut options = StoreOptions::new(name)
        .directory(dir)
        .migration_config(MigrationConfig::new().max_concurrency(max_concurrency));
    if no_media {
        options = options.services(MigrationServices::without_media());
    }
    let target = if latest {
        Some(default_registry()?.latest_version())
    } else {
        to
    };
    if let Some(target) = target {
        options = options.target_version(target);
    }

    let (store, report) = open_store_with_report(options)
        .await
        .context("Upgrade failed; the store keeps its last committed version")?;
    info!(schema_version = store.schema_version(), "store ready");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn export_store(
    dir: &Path,
    name: &str,
    out: &Path,
    maps: Vec<String>,
    tokens: Vec<String>,
) -> Result<()> {
    let store = open_committed(dir, name).await?;
    let snapshot = if maps.is_empty() && tokens.is_empty() {
        export(&store, |_, _| true)?
    } else {
        let selection = ExportSelection::new(maps, tokens);
        export(&store, |table, record| selection.includes(table, record))?
    };

    let bytes = snapshot.to_bytes()?;
    fs::write(out, &bytes)
        .await
        .with_context(|| format!("Failed to write export to '{}'", out.display()))?;
    println!(
        "Exported {} records at version {} to {}",
        snapshot.record_count(),
        snapshot.schema_version,
        out.display()
    );
    Ok(())
}

async fn import_file(dir: &Path, name: &str, file: &Path, tables: Vec<String>) -> Result<()> {
    let bytes = fs::read(file)
        .await
        .with_context(|| format!("Failed to read '{}'", file.display()))?;
    let snapshot = ExportSnapshot::from_bytes(&bytes)?;
    let mut store = open_committed(dir, name).await?;

    let mut options = ImportOptions::new().on_progress(Arc::new(|table: &str, done: usize, total: usize| {
        info!(table = %table, done, total, "imported table");
    }));
    if !tables.is_empty() {
        options = options.only_tables(tables);
    }
    let report = import(&mut store, &snapshot, options).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn load(
    dir: &Path,
    name: &str,
    table: &str,
    key: Option<&str>,
    include_files: bool,
    packed: Option<&Path>,
) -> Result<()> {
    let store = open_committed(dir, name).await?;
    let view = store.table(table)?;

    if let Some(key) = key {
        let record = view
            .get(key)
            .ok_or_else(|| anyhow!("No record '{}' in table '{}'", key, table))?;
        println!("{}", serde_json::to_string_pretty(&record.to_json())?);
        return Ok(());
    }

    let records = view.load(!include_files);
    match packed {
        Some(path) => {
            fs::write(path, pack_records(&records)?)
                .await
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            println!("Packed {} records into {}", records.len(), path.display());
        }
        None => {
            let json: Vec<_> = records.iter().map(|record| record.to_json()).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
            if !include_files {
                info!(excluded = ?FILE_FIELDS, "binary fields left out");
            }
        }
    }
    Ok(())
}
