use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::errors::{RelinkError, Result};

/// Name of the configuration file stored inside the `.lci-relink` directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory holding the configuration and the store.
pub const WORKSPACE_DIR: &str = ".lci-relink";

/// File name of the SQLite store inside the workspace directory.
pub const STORE_FILENAME: &str = "relink.db";

/// Configuration of a relinking workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelinkConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Folder holding the batch files, relative to the workspace root.
    pub input_dir: String,
    /// Glob pattern selecting batch files inside `input_dir`.
    pub input_pattern: String,
    /// Technosphere label used inside the batch files.
    pub background_db_label: String,
    /// Actual technosphere database; references to `background_db_label`
    /// are rewritten to it when set.
    pub technosphere_db: Option<String>,
    /// Primary biosphere reference collection; `load-biosphere` writes here
    /// by default.
    pub biosphere_db: String,
    /// Further biosphere collections indexed together with the primary one.
    pub additional_biosphere_dbs: Vec<String>,
    /// Namespace synthetic flows are created in.
    pub synthetic_db: String,
    /// Whether unresolvable biosphere exchanges get a synthetic flow.
    pub allow_synthetic_flows: bool,
    /// Optional override table (CSV/TSV), relative to the workspace root.
    pub override_table: Option<String>,
    /// Replace inventory databases that already exist in the store.
    pub overwrite_databases: bool,
    /// Alias table for name-only matching: name to synonym names.
    pub name_aliases: BTreeMap<String, Vec<String>>,
}

impl Default for RelinkConfig {
    fn default() -> Self {
        Self {
            version: 1,
            input_dir: "inventories".to_string(),
            input_pattern: "*.json".to_string(),
            background_db_label: "ecoinvent 3.10 cutoff".to_string(),
            technosphere_db: None,
            biosphere_db: "biosphere3".to_string(),
            additional_biosphere_dbs: Vec::new(),
            synthetic_db: "biosphere_custom".to_string(),
            allow_synthetic_flows: false,
            override_table: None,
            overwrite_databases: true,
            name_aliases: BTreeMap::new(),
        }
    }
}

impl RelinkConfig {
    /// Database the background label resolves to.
    pub fn technosphere_target(&self) -> &str {
        self.technosphere_db
            .as_deref()
            .unwrap_or(&self.background_db_label)
    }

    /// Every biosphere collection resolution runs against, primary first,
    /// without repeats.
    pub fn biosphere_databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(1 + self.additional_biosphere_dbs.len());
        for name in std::iter::once(&self.biosphere_db).chain(&self.additional_biosphere_dbs) {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        names
    }

    /// Whether `name` is one of the reference or synthetic collections a
    /// batch must never write into.
    pub fn is_reserved_database(&self, name: &str) -> bool {
        name == self.synthetic_db || self.biosphere_databases().contains(&name)
    }

    /// Checks settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.biosphere_db.trim().is_empty() {
            return Err(RelinkError::Config {
                message: "biosphere_db must not be empty".to_string(),
            });
        }
        if self.synthetic_db.trim().is_empty() {
            return Err(RelinkError::Config {
                message: "synthetic_db must not be empty".to_string(),
            });
        }
        if self.additional_biosphere_dbs.iter().any(|n| n.trim().is_empty()) {
            return Err(RelinkError::Config {
                message: "additional_biosphere_dbs must not contain empty names".to_string(),
            });
        }
        if self.biosphere_databases().contains(&self.synthetic_db.as_str()) {
            return Err(RelinkError::Config {
                message: format!(
                    "synthetic_db '{}' must differ from every biosphere database",
                    self.synthetic_db
                ),
            });
        }
        Pattern::new(&self.input_pattern).map_err(|e| RelinkError::Config {
            message: format!("invalid input_pattern '{}': {e}", self.input_pattern),
        })?;
        Ok(())
    }
}

/// Returns the path to the `.lci-relink` directory within the given root.
pub fn get_workspace_dir(root: &Path) -> PathBuf {
    root.join(WORKSPACE_DIR)
}

/// Returns the path to the configuration file within the workspace directory.
pub fn get_config_path(root: &Path) -> PathBuf {
    get_workspace_dir(root).join(CONFIG_FILENAME)
}

/// Returns the path to the SQLite store within the workspace directory.
pub fn get_store_path(root: &Path) -> PathBuf {
    get_workspace_dir(root).join(STORE_FILENAME)
}

fn config_error(action: &str, path: &Path, err: impl std::fmt::Display) -> RelinkError {
    RelinkError::Config {
        message: format!("cannot {action} '{}': {err}", path.display()),
    }
}

/// Loads the workspace configuration, or the defaults when the workspace has
/// no `config.json` yet. Missing keys take their default values.
pub fn load_config(root: &Path) -> Result<RelinkConfig> {
    let path = get_config_path(root);
    if !path.exists() {
        return Ok(RelinkConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(|e| config_error("read config", &path, e))?;
    serde_json::from_str(&contents).map_err(|e| config_error("parse config", &path, e))
}

/// Writes the configuration next to the store. The JSON goes to a sibling
/// `.tmp` file that is then renamed over `config.json`.
pub fn save_config(root: &Path, config: &RelinkConfig) -> Result<()> {
    let dir = get_workspace_dir(root);
    fs::create_dir_all(&dir).map_err(|e| config_error("create workspace", &dir, e))?;

    let path = get_config_path(root);
    let staging = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(config)?;

    fs::write(&staging, json).map_err(|e| config_error("write", &staging, e))?;
    fs::rename(&staging, &path).map_err(|e| config_error("replace config with", &staging, e))
}

/// Lists the batch files under `input_dir` matching `input_pattern`, sorted
/// by name. Editor lock files (`~$...`) are skipped.
pub fn find_batch_files(root: &Path, config: &RelinkConfig) -> Result<Vec<PathBuf>> {
    let dir = root.join(&config.input_dir);
    if !dir.is_dir() {
        return Err(RelinkError::Input {
            message: "input folder not found".to_string(),
            path: dir.display().to_string(),
        });
    }

    let pattern = Pattern::new(&config.input_pattern).map_err(|e| RelinkError::Config {
        message: format!("invalid input_pattern '{}': {e}", config.input_pattern),
    })?;

    let mut files = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("~$") {
            continue;
        }
        if pattern.matches(name) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
