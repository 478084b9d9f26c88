use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use tracing_subscriber::EnvFilter;

use lci_relink::relinker::{Relinker, RunOptions};

/// Relink life cycle inventory exchanges against reference databases.
#[derive(Parser)]
#[command(name = "lci-relink", about = "Relink inventory exchanges against reference databases")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a workspace (config + store)
    Init {
        /// Workspace path (default: current directory)
        path: Option<String>,
    },
    /// Load a biosphere reference collection from a JSON file
    LoadBiosphere {
        /// JSON array of {name, categories, unit, code}
        file: PathBuf,
        /// Database name (default: configured biosphere_db)
        #[arg(short, long)]
        name: Option<String>,
        /// Workspace path
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Load a technosphere reference collection from a JSON file
    LoadTechnosphere {
        /// JSON array of {name, reference product, location, code}
        file: PathBuf,
        /// Database name
        #[arg(short, long)]
        name: String,
        /// Workspace path
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Relink, validate and commit every batch file of the input folder
    Run {
        /// Workspace path (default: current directory)
        path: Option<String>,
        /// Create synthetic flows for unresolvable biosphere exchanges
        #[arg(long)]
        allow_synthetic: bool,
    },
    /// Delete a database and everything it owns from the store
    Delete {
        /// Database name
        name: String,
        /// Workspace path
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Show store statistics
    Status {
        /// Workspace path (default: current directory)
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> lci_relink::errors::Result<()> {
    match cli.command {
        Commands::Init { path } => {
            let root = resolve_path(path);
            Relinker::init(&root)?;
            println!("Initialized workspace at {}", root.display());
        }
        Commands::LoadBiosphere { file, name, path } => {
            let relinker = Relinker::open(&resolve_path(path))?;
            let name = name.unwrap_or_else(|| relinker.config().biosphere_db.clone());
            let count = relinker.load_biosphere(&file, &name)?;
            println!("Loaded {} flows into '{}'", count, name);
        }
        Commands::LoadTechnosphere { file, name, path } => {
            let relinker = Relinker::open(&resolve_path(path))?;
            let count = relinker.load_technosphere(&file, &name)?;
            println!("Loaded {} processes into '{}'", count, name);
        }
        Commands::Run {
            path,
            allow_synthetic,
        } => {
            let relinker = Relinker::open(&resolve_path(path))?;
            let options = RunOptions {
                allow_synthetic: allow_synthetic.then_some(true),
            };
            let reports = relinker.run(&options)?;
            for report in &reports {
                println!(
                    "{}: {} datasets, {} exchanges, {} unlinked -> {:?} ({} synthetic, {}ms)",
                    report.file,
                    report.statistics.datasets,
                    report.statistics.exchanges,
                    report.statistics.unlinked,
                    report.databases,
                    report.synthetic_created,
                    report.duration_ms
                );
                let r = &report.resolution;
                println!(
                    "  technosphere: {} linked, {} skipped, {} unmatched",
                    r.technosphere_linked, r.technosphere_skipped, r.technosphere_unmatched
                );
                println!(
                    "  biosphere: {} exact, {} mapped, {} name-only, {} synthetic",
                    r.biosphere_exact, r.biosphere_mapped, r.biosphere_name_only, r.biosphere_synthetic
                );
            }
            println!("Committed {} file(s)", reports.len());
        }
        Commands::Delete { name, path } => {
            let relinker = Relinker::open(&resolve_path(path))?;
            if relinker.delete_database(&name)? {
                println!("Deleted '{}'", name);
            } else {
                println!("No database named '{}'", name);
            }
        }
        Commands::Status { path, json } => {
            let relinker = Relinker::open(&resolve_path(path))?;
            let stats = relinker.get_stats()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).unwrap_or_default()
                );
            } else {
                println!("lci-relink status");
                println!("  Flows:     {}", stats.flow_count);
                println!("  Processes: {}", stats.process_count);
                println!("  Datasets:  {}", stats.dataset_count);
                println!("  Exchanges: {}", stats.exchange_count);
                println!("  DB Size:   {} bytes", stats.db_size_bytes);
                if !stats.databases.is_empty() {
                    println!("\n  Databases:");
                    for (name, kind) in &stats.databases {
                        println!("    {} ({})", name, kind);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Resolves an optional path argument to a `PathBuf`.
///
/// Defaults to the current working directory if no path is provided.
fn resolve_path(path: Option<String>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
