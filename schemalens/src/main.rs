//! Schema knowledge command-line tool.
//!
//! Operates on a directory of persisted snapshots, one per database id, and
//! exposes the engine's operations for scripting and inspection:
//! merging raw extractions, learning from queries, diffing snapshots and
//! producing the compressed prompt text.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use schemalens_core::{
    BuilderConfig, CompressionOptions, JsonFileSnapshotStore, LearnRequest, ResultSet, SchemaBuilder,
    SnapshotStore, StaticSchemaExtractor, compress_with_report, diff, init_logging,
    observation::RawSchema, validate_and_parse_snapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "schemalens")]
#[command(about = "Progressive schema knowledge for partially observed databases")]
#[command(version)]
#[command(long_about = "
SchemaLens - learn a database schema from partial observations

Snapshots are kept as JSON files in the store directory, one per database id.
Every command works on the database selected with --database.

EXAMPLES:
  schemalens --database shop extract --input raw_schema.json
  schemalens --database shop learn --sql 'SELECT o.total FROM orders o' --results rows.json
  schemalens --database shop compress --tables orders --max-tokens 800
  schemalens diff before.json after.json
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Snapshot store directory
    #[arg(long, env = "SCHEMALENS_STORE", default_value = ".schemalens")]
    store: PathBuf,

    /// Database id the command operates on
    #[arg(long, env = "SCHEMALENS_DATABASE", default_value = "default")]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored snapshot as JSON
    Show,
    /// Merge a raw extraction document into the snapshot
    Extract(ExtractArgs),
    /// Learn from a query and, optionally, its results
    Learn(LearnArgs),
    /// Print the compressed schema text
    Compress(CompressArgs),
    /// Print the structural diff between two snapshot files
    Diff(DiffArgs),
    /// Remove every stored snapshot
    Clear,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Raw extraction document (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Extract even when the stored snapshot is fresh
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct LearnArgs {
    /// SQL text of the executed query
    #[arg(long)]
    sql: String,

    /// Result grid as JSON: {"columns": [...], "rows": [...]}
    #[arg(long)]
    results: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompressArgs {
    /// Tables the prompt is about (prioritized)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Token budget
    #[arg(long, default_value_t = CompressionOptions::default().max_tokens)]
    max_tokens: usize,

    /// Maximum number of tables
    #[arg(long, default_value_t = CompressionOptions::default().max_tables)]
    max_tables: usize,

    /// Maximum number of columns per table
    #[arg(long, default_value_t = CompressionOptions::default().max_columns_per_table)]
    max_columns: usize,

    /// Leave relationships out of the output
    #[arg(long)]
    no_relationships: bool,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Earlier snapshot file
    old: PathBuf,
    /// Later snapshot file
    new: PathBuf,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet)?;
    schemalens_core::initialize_snapshot_validator()
        .context("Failed to initialize snapshot validator")?;

    match &cli.command {
        Command::Show => show(&cli).await,
        Command::Extract(args) => extract(&cli, args).await,
        Command::Learn(args) => learn(&cli, args).await,
        Command::Compress(args) => compress(&cli, args).await,
        Command::Diff(args) => print_diff(args).await,
        Command::Clear => clear(&cli).await,
    }
}

async fn open_store(cli: &Cli) -> Result<Arc<JsonFileSnapshotStore>> {
    let store = JsonFileSnapshotStore::open(&cli.store)
        .await
        .with_context(|| format!("Failed to open snapshot store {}", cli.store.display()))?;
    Ok(Arc::new(store))
}

async fn start_builder(cli: &Cli, extractor: StaticSchemaExtractor) -> Result<SchemaBuilder> {
    let store = open_store(cli).await?;
    let builder = SchemaBuilder::new(
        cli.database.clone(),
        store,
        Arc::new(extractor),
        BuilderConfig::default(),
    )?;
    builder
        .initialize()
        .await
        .with_context(|| format!("Failed to load snapshot for '{}'", cli.database))?;
    Ok(builder)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn show(cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    let snapshot = store.require_snapshot(&cli.database).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn extract(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let raw: RawSchema = read_json(&args.input).await?;
    let builder = start_builder(cli, StaticSchemaExtractor::new(raw)).await?;

    let result = builder.extract_schema(args.force).await;
    builder.shutdown().await?;
    let snapshot = result.context("Schema extraction failed")?;

    let stats = snapshot.stats();
    info!(database_id = %cli.database, "Extraction merged");
    println!("Database: {}", snapshot.database_id);
    println!("Tables: {}", stats.tables);
    println!("Columns: {}", stats.columns);
    println!("Relationships: {}", stats.relationships);
    Ok(())
}

async fn learn(cli: &Cli, args: &LearnArgs) -> Result<()> {
    if args.sql.trim().is_empty() {
        bail!("--sql must not be empty");
    }
    let mut request = LearnRequest::new(args.sql.clone());
    if let Some(path) = &args.results {
        let result: ResultSet = read_json(path).await?;
        request = request.with_result(result);
    }

    let builder = start_builder(cli, StaticSchemaExtractor::empty()).await?;
    let before = builder.snapshot()?;
    builder.learn_from_query(request)?;
    builder.flush().await?;
    let after = builder.snapshot()?;
    builder.shutdown().await?;

    let changes = diff(&before, &after);
    if changes.is_empty() {
        println!("No new schema information");
    } else {
        let summary = changes.summary();
        println!("Tables added: {}", summary.tables_added);
        println!("Columns added: {}", summary.columns_added);
        println!("Columns updated: {}", summary.columns_modified);
    }
    Ok(())
}

async fn compress(cli: &Cli, args: &CompressArgs) -> Result<()> {
    let options = CompressionOptions::new()
        .with_max_tokens(args.max_tokens)
        .with_max_tables(args.max_tables)
        .with_max_columns_per_table(args.max_columns)
        .with_relationships(!args.no_relationships);
    options.validate()?;

    let store = open_store(cli).await?;
    let snapshot = store.require_snapshot(&cli.database).await?;
    let (compressed, report) = compress_with_report(&snapshot, args.tables.as_slice(), &options);

    if !report.within_budget() {
        warn!(
            estimated_tokens = report.estimated_tokens,
            max_tokens = report.max_tokens,
            "Output exceeds the token budget"
        );
    }
    info!(
        tables = report.tables_kept,
        tables_total = report.tables_total,
        columns = report.columns_kept,
        columns_total = report.columns_total,
        "Schema compressed"
    );
    print!("{}", compressed);
    Ok(())
}

async fn print_diff(args: &DiffArgs) -> Result<()> {
    let mut snapshots = Vec::with_capacity(2);
    for path in [&args.old, &args.new] {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let snapshot = validate_and_parse_snapshot(&text)
            .with_context(|| format!("Invalid snapshot in {}", path.display()))?;
        snapshots.push(snapshot);
    }
    let [old, new] = <[_; 2]>::try_from(snapshots)
        .map_err(|_| anyhow::anyhow!("expected exactly two snapshots"))?;

    if old.database_id != new.database_id {
        warn!(
            old = %old.database_id,
            new = %new.database_id,
            "Comparing snapshots of different databases"
        );
    }
    println!("{}", serde_json::to_string_pretty(&diff(&old, &new))?);
    Ok(())
}

async fn clear(cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    store.clear_all().await?;
    println!("Cleared snapshot store {}", cli.store.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compress_arguments() {
        let cli = Cli::try_parse_from([
            "schemalens",
            "--database",
            "shop",
            "compress",
            "--tables",
            "orders,users",
            "--max-tokens",
            "800",
            "--no-relationships",
        ])
        .unwrap();

        assert_eq!(cli.database, "shop");
        let Command::Compress(args) = cli.command else {
            panic!("expected compress command");
        };
        assert_eq!(args.tables, vec!["orders", "users"]);
        assert_eq!(args.max_tokens, 800);
        assert_eq!(args.max_tables, 20);
        assert!(args.no_relationships);
    }

    #[test]
    fn test_verbosity_after_subcommand() {
        let cli = Cli::try_parse_from(["schemalens", "show", "-vv"]).unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert!(!cli.global.quiet);
    }

    #[test]
    fn test_diff_requires_two_files() {
        assert!(Cli::try_parse_from(["schemalens", "diff", "a.json"]).is_err());
    }

    #[tokio::test]
    async fn test_file_round_trip_through_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::try_parse_from([
            "schemalens",
            "--store",
            dir.path().to_str().unwrap(),
            "--database",
            "shop",
            "clear",
        ])
        .unwrap();

        let args = LearnArgs {
            sql: "SELECT users.email FROM users".to_string(),
            results: None,
        };
        learn(&cli, &args).await.unwrap();

        let store = open_store(&cli).await.unwrap();
        let snapshot = store.require_snapshot("shop").await.unwrap();
        assert!(snapshot.table("users").unwrap().column("email").is_ok());

        clear(&cli).await.unwrap();
        assert!(show(&cli).await.is_err());
    }
}
