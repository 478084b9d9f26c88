use std::collections::{BTreeMap, HashMap, HashSet};

use crate::normalize::{normalize, normalize_categories};
use crate::types::{FlowKey, ReferenceFlow, ReferenceProcess};

/// Exact biosphere key: normalized `(name, categories, unit)`.
pub type ExactKey = (String, Vec<String>, String);

/// Process key: normalized `(name, reference product, location)`.
pub type ProcessKey = (String, String, String);

/// A key that maps to one entity, or to several distinct ones.
///
/// Ambiguous keys never resolve; the caller falls through to the next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Unique(FlowKey),
    Ambiguous,
}

impl Entry {
    fn merge(&mut self, key: FlowKey) {
        if let Entry::Unique(existing) = self {
            if *existing != key {
                *self = Entry::Ambiguous;
            }
        }
    }

    fn unique(&self) -> Option<&FlowKey> {
        match self {
            Entry::Unique(key) => Some(key),
            Entry::Ambiguous => None,
        }
    }
}

/// A name-only match candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowCandidate {
    pub key: FlowKey,
    /// Normalized category path.
    pub categories: Vec<String>,
    /// Normalized unit.
    pub unit: String,
}

impl FlowCandidate {
    /// First element of the category path, if any.
    pub fn top_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }
}

/// Read-only lookup structures over one or more biosphere collections.
#[derive(Debug, Default)]
pub struct BiosphereIndex {
    exact: HashMap<ExactKey, Entry>,
    by_name: HashMap<String, Vec<FlowCandidate>>,
    /// Normalized name to synonym names.
    aliases: HashMap<String, Vec<String>>,
    flow_count: usize,
    skipped: usize,
}

impl BiosphereIndex {
    /// Builds the exact and name-only indices.
    ///
    /// Flows without a name, a unit or a non-empty code are skipped. Candidate
    /// lists keep the input order of the flows.
    pub fn build<'a, I>(flows: I) -> Self
    where
        I: IntoIterator<Item = &'a ReferenceFlow>,
    {
        let mut index = Self::default();
        for flow in flows {
            index.insert(flow);
        }
        index
    }

    /// Attaches an alias table consulted when gathering name-only candidates.
    pub fn with_aliases(mut self, aliases: &BTreeMap<String, Vec<String>>) -> Self {
        self.aliases = aliases
            .iter()
            .map(|(name, synonyms)| (normalize(name), synonyms.clone()))
            .collect();
        self
    }

    fn insert(&mut self, flow: &ReferenceFlow) {
        let (Some(name), Some(unit), Some(code)) = (&flow.name, &flow.unit, &flow.code) else {
            self.skipped += 1;
            return;
        };
        if code.is_empty() {
            self.skipped += 1;
            return;
        }

        let key = FlowKey::new(flow.database.clone(), code.clone());
        let name_n = normalize(name);
        let cats_n = normalize_categories(&flow.categories);
        let unit_n = normalize(unit);

        self.exact
            .entry((name_n.clone(), cats_n.clone(), unit_n.clone()))
            .and_modify(|e| e.merge(key.clone()))
            .or_insert_with(|| Entry::Unique(key.clone()));

        self.by_name.entry(name_n).or_default().push(FlowCandidate {
            key,
            categories: cats_n,
            unit: unit_n,
        });
        self.flow_count += 1;
    }

    /// Looks up an already normalized `(name, categories, unit)` triple.
    ///
    /// Returns `None` on a miss and when the triple names more than one flow.
    pub fn lookup_exact(&self, name: &str, categories: &[String], unit: &str) -> Option<&FlowKey> {
        let key = (name.to_string(), categories.to_vec(), unit.to_string());
        self.exact.get(&key).and_then(Entry::unique)
    }

    /// Gathers every flow sharing the (normalized) name, including flows
    /// listed under the name's aliases, de-duplicated by `(database, code)`.
    pub fn candidates(&self, name: &str) -> Vec<FlowCandidate> {
        let name_n = normalize(name);
        let mut gathered: Vec<&FlowCandidate> = Vec::new();

        if let Some(list) = self.by_name.get(&name_n) {
            gathered.extend(list);
        }
        if let Some(synonyms) = self.aliases.get(&name_n) {
            for synonym in synonyms {
                if let Some(list) = self.by_name.get(&normalize(synonym)) {
                    gathered.extend(list);
                }
            }
        }

        let mut seen: HashSet<&FlowKey> = HashSet::new();
        let mut out = Vec::with_capacity(gathered.len());
        for candidate in gathered {
            if seen.insert(&candidate.key) {
                out.push(candidate.clone());
            }
        }
        out
    }

    /// Number of indexed flows.
    pub fn len(&self) -> usize {
        self.flow_count
    }

    pub fn is_empty(&self) -> bool {
        self.flow_count == 0
    }

    /// Number of flows skipped for missing fields.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Read-only `(name, reference product, location)` index over one
/// technosphere database.
#[derive(Debug)]
pub struct ProcessIndex {
    database: String,
    entries: HashMap<ProcessKey, Entry>,
    skipped: usize,
}

impl ProcessIndex {
    /// Builds the index for `database`. Processes lacking any of name,
    /// reference product, location or code are skipped.
    pub fn build<'a, I>(database: &str, processes: I) -> Self
    where
        I: IntoIterator<Item = &'a ReferenceProcess>,
    {
        let mut entries: HashMap<ProcessKey, Entry> = HashMap::new();
        let mut skipped = 0;

        for process in processes {
            let fields = (
                non_empty(&process.name),
                non_empty(&process.reference_product),
                non_empty(&process.location),
                non_empty(&process.code),
            );
            let (Some(name), Some(product), Some(location), Some(code)) = fields else {
                skipped += 1;
                continue;
            };

            let key = FlowKey::new(database, code);
            entries
                .entry((normalize(name), normalize(product), normalize(location)))
                .and_modify(|e| e.merge(key.clone()))
                .or_insert_with(|| Entry::Unique(key));
        }

        Self {
            database: database.to_string(),
            entries,
            skipped,
        }
    }

    /// Looks up a process; inputs are normalized here.
    pub fn lookup(&self, name: &str, reference_product: &str, location: &str) -> Option<&FlowKey> {
        let key = (
            normalize(name),
            normalize(reference_product),
            normalize(location),
        );
        self.entries.get(&key).and_then(Entry::unique)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
