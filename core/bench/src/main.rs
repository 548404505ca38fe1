/// Algorithm Platform command-line tool
///
/// Usage:
///   algo-platform [--db-path <path>] <command>
///
/// The database path falls back to the DB_PATH environment variable.
/// Log verbosity follows RUST_LOG (default: info).

use algo_platform_bench::{
    BenchmarkConfig, BenchmarkHarness, HarnessFileConfig, ProcessRunner, ProcessRunnerConfig,
};
use algo_platform_schemas::{AlgorithmId, CategoryId};
use algo_platform_store::{
    dedup_algorithms, find_duplicate_groups, seed_defaults, verify_integrity, Database,
    GroupOutcome, StoreConfig,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "algo-platform")]
#[command(about = "Register, benchmark and maintain algorithm implementations")]
struct Args {
    /// Path to SQLite database file
    #[arg(long, short, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and seed default categories and samples
    Init,
    /// Register a new algorithm from a source file
    Add {
        name: String,
        description: String,
        file: PathBuf,
        #[arg(long, short, default_value_t = 1)]
        category: i64,
    },
    /// Append a new version to an existing algorithm
    AddVersion { algorithm_id: i64, file: PathBuf },
    /// List algorithms with version and metric counts
    List,
    /// Benchmark the latest version of every algorithm
    Test {
        /// JSON file with input_sizes, trials_per_size, timeout_per_run_ms, seed, command
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        sizes: Option<Vec<u64>>,
        #[arg(long)]
        trials: Option<u32>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Runner command; `{driver}` and `{code}` are replaced with file paths
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        command: Option<Vec<String>>,
    },
    /// Print the metrics of an algorithm as JSON
    Metrics { algorithm_id: i64 },
    /// Remove duplicate algorithms and everything that depends on them
    Clean {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Report orphaned rows
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let db_path = match args.db_path {
        Some(path) => path,
        None => std::env::var("DB_PATH")
            .map(PathBuf::from)
            .context("no database path: pass --db-path or set DB_PATH")?,
    };
    let store_config = StoreConfig::new(&db_path);

    match args.command {
        Command::Init => init(&store_config),
        Command::Add {
            name,
            description,
            file,
            category,
        } => {
            let code = read_code(&file)?;
            let mut db = open(&store_config)?;
            let id = db.register_algorithm(&name, &description, &code, CategoryId(category))?;
            info!("Registered '{}' with ID {}", name, id);
            Ok(())
        }
        Command::AddVersion { algorithm_id, file } => {
            let code = read_code(&file)?;
            let mut db = open(&store_config)?;
            let version_id = db.add_version(AlgorithmId(algorithm_id), &code)?;
            let version = db.latest_version(AlgorithmId(algorithm_id))?;
            info!(
                "Added version {} (ID {}) to algorithm {}",
                version.version_number, version_id, algorithm_id
            );
            Ok(())
        }
        Command::List => list(&open(&store_config)?),
        Command::Test {
            config,
            sizes,
            trials,
            timeout_ms,
            command,
        } => {
            let mut file_config = match config {
                Some(path) => HarnessFileConfig::from_json_file(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => HarnessFileConfig::default(),
            };
            let benchmark = &mut file_config.benchmark;
            if let Some(sizes) = sizes {
                benchmark.input_sizes = sizes;
            }
            if let Some(trials) = trials {
                benchmark.trials_per_size = trials;
            }
            if timeout_ms.is_some() {
                benchmark.timeout_per_run_ms = timeout_ms;
            }
            if let Some(command) = command {
                file_config.runner.command = command;
            }
            let mut db = open(&store_config)?;
            test(&mut db, file_config.benchmark, file_config.runner).await
        }
        Command::Metrics { algorithm_id } => {
            let db = open(&store_config)?;
            let id = AlgorithmId(algorithm_id);
            // Surface NotFound rather than an empty list
            db.get_algorithm(id)?;
            let metrics = db.metrics_for_algorithm(id)?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
            Ok(())
        }
        Command::Clean { yes } => clean(&mut open(&store_config)?, yes),
        Command::Check => check(&open(&store_config)?),
    }
}

fn open(config: &StoreConfig) -> Result<Database> {
    Database::open(config)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))
}

fn read_code(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn init(config: &StoreConfig) -> Result<()> {
    info!("Database: {}", config.db_path.display());
    let mut db = Database::create(config)?;
    if seed_defaults(&mut db)? {
        info!(
            "Seeded {} categories and {} algorithms",
            db.count_categories()?,
            db.count_algorithms()?
        );
    } else {
        info!("Database already contains data, skipping seed");
    }
    Ok(())
}

fn list(db: &Database) -> Result<()> {
    let summaries = db.algorithm_summaries()?;
    if summaries.is_empty() {
        println!("No algorithms registered.");
        return Ok(());
    }

    println!("{:<6} {:<30} {:>9} {:>8}", "ID", "Name", "Versions", "Metrics");
    println!("{}", "-".repeat(56));
    for s in summaries {
        println!(
            "{:<6} {:<30} {:>9} {:>8}",
            s.id, s.name, s.version_count, s.metric_count
        );
    }
    Ok(())
}

async fn test(
    db: &mut Database,
    benchmark: BenchmarkConfig,
    runner: ProcessRunnerConfig,
) -> Result<()> {
    info!(
        "Input sizes: {:?}, trials: {}, runner: {}",
        benchmark.input_sizes,
        benchmark.trials_per_size,
        runner.command.join(" ")
    );

    let harness = BenchmarkHarness::new(benchmark, ProcessRunner::new(runner)?)?;
    let report = harness.run(db).await?;

    info!("─────────────────────────────────────────────────");
    info!("Algorithms:        {}", report.algorithms);
    info!("Metrics recorded:  {}", report.succeeded());
    info!("Failures:          {}", report.failed());
    for failure in &report.failures {
        match failure.input_size {
            Some(size) => warn!("  {} @ {}: {}", failure.name, size, failure.reason),
            None => warn!("  {}: {}", failure.name, failure.reason),
        }
    }
    Ok(())
}

fn clean(db: &mut Database, yes: bool) -> Result<()> {
    let groups = find_duplicate_groups(db)?;
    if groups.is_empty() {
        info!("No duplicate algorithms found");
        return Ok(());
    }

    println!("Duplicate algorithms:");
    for group in &groups {
        let discard: Vec<String> = group.discard.iter().map(|id| id.to_string()).collect();
        println!(
            "  '{}': keeping ID {}, removing IDs {}",
            group.name,
            group.keep,
            discard.join(", ")
        );
    }

    if !yes && !confirm("Remove duplicates and all their versions, metrics and notes? (y/N): ")? {
        info!("Cleanup cancelled");
        return Ok(());
    }

    let report = dedup_algorithms(db)?;
    for group in &report.groups {
        if let GroupOutcome::RolledBack { reason } = &group.outcome {
            error!("  '{}' rolled back: {}", group.group.name, reason);
        }
    }

    let d = report.deleted;
    info!("Groups committed:     {}", report.committed());
    info!("Groups rolled back:   {}", report.rolled_back());
    info!("Metrics deleted:      {}", d.metrics);
    info!("Versions deleted:     {}", d.versions);
    info!("Improvements deleted: {}", d.improvements);
    info!("Feedback deleted:     {}", d.feedback);
    info!("Mappings deleted:     {}", d.mappings);
    info!("Algorithms deleted:   {}", d.algorithms);

    if report.rolled_back() > 0 {
        bail!("{} duplicate group(s) could not be removed", report.rolled_back());
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn check(db: &Database) -> Result<()> {
    let report = verify_integrity(db)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_consistent() {
        bail!("database has orphaned rows");
    }
    info!("✓ No orphaned rows");
    Ok(())
}
