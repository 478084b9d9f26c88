use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::batch;
use crate::config::{
    find_batch_files, get_store_path, load_config, save_config, RelinkConfig,
};
use crate::context::RunContext;
use crate::db::{CommitRequest, Database, DatabaseKind};
use crate::errors::{RelinkError, Result};
use crate::index::BiosphereIndex;
use crate::overrides::OverrideTable;
use crate::resolver::Resolver;
use crate::synthetic::SyntheticFlowFactory;
use crate::types::*;
use crate::validate::validate_batch;

/// Orchestrates runs over a workspace: store, configuration and input files.
pub struct Relinker {
    db: Database,
    config: RelinkConfig,
    root: PathBuf,
}

/// Options that override the stored configuration for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub allow_synthetic: Option<bool>,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl Relinker {
    /// Initializes a workspace at `root`: writes the default configuration
    /// (unless one exists) and creates the store.
    pub fn init(root: &Path) -> Result<Self> {
        let config = load_config(root)?;
        save_config(root, &config)?;
        let db = Database::initialize(&get_store_path(root))?;

        Ok(Self {
            db,
            config,
            root: root.to_path_buf(),
        })
    }

    /// Opens an initialized workspace.
    pub fn open(root: &Path) -> Result<Self> {
        let config = load_config(root)?;
        let store_path = get_store_path(root);

        if !store_path.exists() {
            return Err(RelinkError::Config {
                message: format!(
                    "no store found at '{}'; run 'lci-relink init' first",
                    store_path.display()
                ),
            });
        }

        let db = Database::open(&store_path)?;
        Ok(Self {
            db,
            config,
            root: root.to_path_buf(),
        })
    }

    /// Returns `true` if a workspace has been initialized at `root`.
    pub fn is_initialized(root: &Path) -> bool {
        get_store_path(root).exists()
    }

    pub fn config(&self) -> &RelinkConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

// ---------------------------------------------------------------------------
// Reference loading
// ---------------------------------------------------------------------------

impl Relinker {
    /// Loads a biosphere collection from a JSON array of
    /// `{name, categories, unit, code}` records, replacing any previous
    /// content of `database`.
    pub fn load_biosphere(&self, path: &Path, database: &str) -> Result<usize> {
        let flows: Vec<ReferenceFlow> = read_json(path)?;
        self.guard_reference_name(database, DatabaseKind::Biosphere)?;
        let count = self.db.replace_flows(database, &flows)?;
        info!(database, flows = count, "loaded biosphere collection");
        Ok(count)
    }

    /// Loads a technosphere collection from a JSON array of
    /// `{name, reference product, location, code}` records.
    pub fn load_technosphere(&self, path: &Path, database: &str) -> Result<usize> {
        let processes: Vec<ReferenceProcess> = read_json(path)?;
        self.guard_reference_name(database, DatabaseKind::Technosphere)?;
        let count = self.db.replace_processes(database, &processes)?;
        info!(database, processes = count, "loaded technosphere collection");
        Ok(count)
    }

    fn guard_reference_name(&self, database: &str, kind: DatabaseKind) -> Result<()> {
        if database == self.config.synthetic_db {
            return Err(RelinkError::Config {
                message: format!("'{database}' is the synthetic namespace"),
            });
        }
        match self.db.database_kind(database)? {
            Some(existing) if existing != kind => Err(RelinkError::Config {
                message: format!(
                    "database '{database}' already exists as {}",
                    existing.as_str()
                ),
            }),
            _ => Ok(()),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| RelinkError::Input {
        message: format!("failed to read file: {e}"),
        path: path.display().to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| RelinkError::Input {
        message: format!("failed to parse file: {e}"),
        path: path.display().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

impl Relinker {
    /// Builds the frozen run context: biosphere indices, override table and
    /// the synthetic flow factory seeded from the store.
    pub fn build_context(&self, options: &RunOptions) -> Result<RunContext<'_>> {
        self.config.validate()?;

        let mut flows = Vec::new();
        for name in self.config.biosphere_databases() {
            match self.db.database_kind(name)? {
                Some(DatabaseKind::Biosphere) => flows.extend(self.db.get_flows(name)?),
                _ => {
                    return Err(RelinkError::UnknownDatabase {
                        name: name.to_string(),
                    })
                }
            }
        }
        let biosphere = BiosphereIndex::build(&flows).with_aliases(&self.config.name_aliases);
        info!(
            databases = ?self.config.biosphere_databases(),
            flows = biosphere.len(),
            skipped = biosphere.skipped(),
            "built biosphere index"
        );

        let overrides = match &self.config.override_table {
            Some(path) => {
                let table = OverrideTable::load(&self.root.join(path))?;
                info!(entries = table.len(), "loaded override table");
                table
            }
            None => OverrideTable::new(),
        };

        let namespace = &self.config.synthetic_db;
        let existing = self.db.get_synthetic_flows(namespace)?;
        let synthetic = SyntheticFlowFactory::with_existing(namespace, existing);
        debug!(
            namespace = synthetic.namespace(),
            flows = synthetic.len(),
            "seeded synthetic flow factory"
        );

        let allow_synthetic = options
            .allow_synthetic
            .unwrap_or(self.config.allow_synthetic_flows);

        Ok(RunContext::new(
            &self.db,
            biosphere,
            overrides,
            synthetic,
            allow_synthetic,
        ))
    }

    /// Processes every batch file of the input folder in order.
    ///
    /// Each file commits independently; the first failing file aborts the run
    /// and leaves files committed before it in place.
    pub fn run(&self, options: &RunOptions) -> Result<Vec<FileReport>> {
        let files = find_batch_files(&self.root, &self.config)?;
        let ctx = self.build_context(options)?;
        let mut resolver = Resolver::new(&ctx);

        let mut reports = Vec::with_capacity(files.len());
        for path in &files {
            reports.push(self.process_file(&ctx, &mut resolver, path)?);
        }
        info!(files = reports.len(), "run finished");
        Ok(reports)
    }

    /// Reads, resolves, validates and commits one batch file.
    pub fn process_file(
        &self,
        ctx: &RunContext<'_>,
        resolver: &mut Resolver<'_, '_>,
        path: &Path,
    ) -> Result<FileReport> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        info!(file = %file, "processing batch file");

        let records = batch::read_batch_file(path)?;
        let mut preparation = PreparationStats::default();
        let datasets = batch::parse_batch(&records, &mut preparation)?;
        self.process_batch(ctx, resolver, &file, datasets, preparation)
    }

    /// Runs an already parsed batch through resolution, validation and commit.
    ///
    /// On any failure the synthetic flows created for this batch are dropped
    /// and nothing is written.
    pub fn process_batch(
        &self,
        ctx: &RunContext<'_>,
        resolver: &mut Resolver<'_, '_>,
        file: &str,
        mut datasets: Vec<Dataset>,
        mut preparation: PreparationStats,
    ) -> Result<FileReport> {
        let start = Instant::now();

        preparation.background_rewired += batch::rewrite_background_label(
            &mut datasets,
            &self.config.background_db_label,
            self.config.technosphere_target(),
        );

        let outcome = self.resolve_validate_commit(ctx, resolver, &mut datasets);
        let (resolution, synthetic_created, databases) = match outcome {
            Ok(done) => done,
            Err(e) => {
                ctx.synthetic.discard_pending();
                warn!(file, error = %e, "batch rejected");
                return Err(e);
            }
        };

        let statistics = batch::statistics(&datasets);
        let report = FileReport {
            file: file.to_string(),
            databases,
            preparation,
            resolution,
            statistics,
            synthetic_created,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            file,
            datasets = report.statistics.datasets,
            exchanges = report.statistics.exchanges,
            unlinked = report.statistics.unlinked,
            synthetic = report.synthetic_created,
            "batch committed"
        );
        Ok(report)
    }

    fn resolve_validate_commit(
        &self,
        ctx: &RunContext<'_>,
        resolver: &mut Resolver<'_, '_>,
        datasets: &mut [Dataset],
    ) -> Result<(ResolutionStats, usize, Vec<String>)> {
        let resolution = resolver.resolve_batch(datasets)?;

        let unlinked = batch::statistics(datasets).unlinked;
        if unlinked > 0 {
            warn!(unlinked, "exchanges remain unlinked before validation");
        }
        validate_batch(datasets)?;

        let databases: Vec<String> = batch::database_names(datasets).into_iter().collect();
        let replace = self.databases_to_replace(&databases)?;

        let synthetic_flows = ctx.synthetic.pending();
        self.db.commit_batch(&CommitRequest {
            replace: &replace,
            synthetic_flows: &synthetic_flows,
            datasets,
        })?;
        ctx.synthetic.mark_committed();

        for name in &databases {
            resolver.forget(name);
        }
        Ok((resolution, synthetic_flows.len(), databases))
    }

    /// Inventory databases of the batch that already exist and will be
    /// replaced. Fails if one of them is a reference collection or the
    /// synthetic namespace, or if overwriting is disabled.
    fn databases_to_replace(&self, databases: &[String]) -> Result<Vec<String>> {
        let mut replace = Vec::new();
        for name in databases {
            if self.config.is_reserved_database(name) {
                return Err(RelinkError::Config {
                    message: format!(
                        "batch writes to '{name}', which is a configured reference or synthetic database"
                    ),
                });
            }
            match self.db.database_kind(name)? {
                None => {}
                Some(DatabaseKind::Inventory) if self.config.overwrite_databases => {
                    info!(database = %name, "replacing existing inventory database");
                    replace.push(name.clone());
                }
                Some(DatabaseKind::Inventory) => {
                    return Err(RelinkError::Config {
                        message: format!(
                            "inventory database '{name}' already exists and overwrite_databases is off"
                        ),
                    })
                }
                Some(kind) => {
                    return Err(RelinkError::Config {
                        message: format!(
                            "batch writes to '{name}', which is a {} collection",
                            kind.as_str()
                        ),
                    })
                }
            }
        }
        Ok(replace)
    }

    /// Removes a database and everything it owns from the store. Returns
    /// `false` if no database of that name exists.
    pub fn delete_database(&self, name: &str) -> Result<bool> {
        let deleted = self.db.delete_database(name)?;
        if deleted {
            info!(database = name, "deleted database");
        }
        Ok(deleted)
    }

    /// Returns aggregate statistics about the store.
    pub fn get_stats(&self) -> Result<StoreStats> {
        self.db.get_stats()
    }
}
