use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Type classification stored on every synthetic flow.
pub const SYNTHETIC_FLOW_TYPE: &str = "emission";

/// A resolved reference: `(database, code)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub database: String,
    pub code: String,
}

impl FlowKey {
    pub fn new(database: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.database, self.code)
    }
}

/// Kinds of exchanges in an inventory dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Production,
    Technosphere,
    Biosphere,
}

#[allow(clippy::should_implement_trait)]
impl ExchangeKind {
    /// Returns the string representation of this exchange kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Production => "production",
            ExchangeKind::Technosphere => "technosphere",
            ExchangeKind::Biosphere => "biosphere",
        }
    }

    /// Parses a string into an `ExchangeKind`, returning `None` for unrecognized values.
    pub fn from_str(s: &str) -> Option<ExchangeKind> {
        match s {
            "production" => Some(ExchangeKind::Production),
            "technosphere" => Some(ExchangeKind::Technosphere),
            "biosphere" => Some(ExchangeKind::Biosphere),
            _ => None,
        }
    }
}

/// A directed reference from a dataset to another entity.
///
/// `input` is the resolved reference. While it is `None` the descriptive
/// fields (`name`, `categories`, `unit`, `database`, `reference_product`,
/// `location`) are what the resolver matches on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub kind: ExchangeKind,
    pub amount: f64,
    pub input: Option<FlowKey>,
    pub name: Option<String>,
    pub categories: Vec<String>,
    pub unit: Option<String>,
    /// Source database label the exchange claims to point into.
    pub database: Option<String>,
    pub reference_product: Option<String>,
    pub location: Option<String>,
    pub comment: Option<String>,
}

impl Exchange {
    /// Creates an unresolved exchange with only a kind and an amount.
    pub fn new(kind: ExchangeKind, amount: f64) -> Self {
        Self {
            kind,
            amount,
            input: None,
            name: None,
            categories: Vec::new(),
            unit: None,
            database: None,
            reference_product: None,
            location: None,
            comment: None,
        }
    }

    /// Short description used in error messages, e.g. `#3 biosphere 'Carbon dioxide'`.
    pub fn describe(&self, position: usize) -> String {
        match &self.name {
            Some(name) => format!("#{position} {} '{name}'", self.kind.as_str()),
            None => format!("#{position} {}", self.kind.as_str()),
        }
    }
}

/// An inventory dataset (activity) owning an ordered list of exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub database: String,
    pub code: String,
    pub name: String,
    pub reference_product: Option<String>,
    pub location: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub exchanges: Vec<Exchange>,
}

impl Dataset {
    /// Identity of this dataset as a reference key.
    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.database.clone(), self.code.clone())
    }

    /// `database/code` label used in log lines and error messages.
    pub fn label(&self) -> String {
        format!("{}/{}", self.database, self.code)
    }
}

/// A biosphere flow in a reference collection.
///
/// Fields are optional because reference collections are not guaranteed to be
/// complete; index construction skips records missing a required field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFlow {
    #[serde(default)]
    pub database: String,
    #[serde(default, alias = "identifier")]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_categories")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// A technosphere process in a reference collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProcess {
    #[serde(default)]
    pub database: String,
    #[serde(default, alias = "identifier")]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "reference product")]
    pub reference_product: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// A biosphere flow created on demand in the synthetic namespace.
///
/// `code` is the content fingerprint of the canonical `(name, categories, unit)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticFlow {
    pub database: String,
    pub code: String,
    pub name: String,
    pub categories: Vec<String>,
    pub unit: String,
    pub flow_type: String,
}

/// Matching stage that produced a biosphere link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionStage {
    Exact,
    MappedExact,
    NameOnly,
    Synthetic,
}

impl ResolutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStage::Exact => "exact",
            ResolutionStage::MappedExact => "mapped-exact",
            ResolutionStage::NameOnly => "name-only",
            ResolutionStage::Synthetic => "synthetic",
        }
    }
}

/// Per-stage change counts of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    /// Technosphere exchanges linked through a process index.
    pub technosphere_linked: usize,
    /// Technosphere exchanges skipped: incomplete descriptor or unknown database.
    pub technosphere_skipped: usize,
    /// Technosphere exchanges whose lookup missed.
    pub technosphere_unmatched: usize,
    pub biosphere_exact: usize,
    pub biosphere_mapped: usize,
    pub biosphere_name_only: usize,
    pub biosphere_synthetic: usize,
    /// Biosphere exchanges without a usable name or unit.
    pub biosphere_skipped: usize,
}

impl ResolutionStats {
    /// Total number of biosphere exchanges linked by any stage.
    pub fn biosphere_linked(&self) -> usize {
        self.biosphere_exact + self.biosphere_mapped + self.biosphere_name_only + self.biosphere_synthetic
    }

    pub(crate) fn record(&mut self, stage: ResolutionStage) {
        match stage {
            ResolutionStage::Exact => self.biosphere_exact += 1,
            ResolutionStage::MappedExact => self.biosphere_mapped += 1,
            ResolutionStage::NameOnly => self.biosphere_name_only += 1,
            ResolutionStage::Synthetic => self.biosphere_synthetic += 1,
        }
    }
}

/// Counts produced by the pre-resolution cleanup passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationStats {
    /// `"db::code"` string inputs converted to pairs.
    pub inputs_normalized: usize,
    /// References rewritten from the background label to the real database.
    pub background_rewired: usize,
    /// Null text fields replaced by empty strings.
    pub text_fields_sanitized: usize,
}

/// Summary statistics of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub datasets: usize,
    pub exchanges: usize,
    pub unlinked: usize,
}

/// Outcome of processing and committing one batch file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub databases: Vec<String>,
    pub preparation: PreparationStats,
    pub resolution: ResolutionStats,
    pub statistics: BatchStatistics,
    pub synthetic_created: usize,
    pub duration_ms: u64,
}

/// Aggregate information about the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Registered databases by name, with their kind.
    pub databases: BTreeMap<String, String>,
    pub flow_count: u64,
    pub process_count: u64,
    pub dataset_count: u64,
    pub exchange_count: u64,
    pub db_size_bytes: u64,
}

/// Accepts categories as a list, a single string, or null.
pub fn deserialize_categories<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(categories_from_value(value.as_ref()))
}

/// Coerces a JSON value into a category path.
///
/// Lists keep their element order (non-string elements are stringified), a
/// non-empty string becomes a one-element path, anything else is empty.
pub fn categories_from_value(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
