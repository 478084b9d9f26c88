use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::normalize::{normalize, normalize_categories};
use crate::types::{FlowKey, SyntheticFlow, SYNTHETIC_FLOW_TYPE};

/// Computes the content fingerprint of a biosphere descriptor.
///
/// The triple is normalized and JSON-encoded before hashing so that element
/// boundaries cannot collide (`["a b"]` vs `["a", "b"]`).
pub fn fingerprint<S: AsRef<str>>(name: &str, categories: &[S], unit: &str) -> String {
    let canonical = (normalize(name), normalize_categories(categories), normalize(unit));
    let encoded = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
struct FactoryState {
    known: HashMap<String, SyntheticFlow>,
    /// Codes created since the last commit, in creation order.
    pending: Vec<String>,
}

/// Get-or-create front end over the synthetic flow namespace.
///
/// The factory is seeded with the flows already persisted in the namespace
/// and stages new flows in memory until the owning batch commits. All access
/// goes through one mutex, so the read-check-create sequence is serialized
/// even when resolution runs on several threads.
#[derive(Debug)]
pub struct SyntheticFlowFactory {
    namespace: String,
    state: Mutex<FactoryState>,
}

impl SyntheticFlowFactory {
    /// Creates an empty factory for `namespace`.
    pub fn new(namespace: &str) -> Self {
        Self::with_existing(namespace, Vec::new())
    }

    /// Creates a factory that already knows `flows` (typically loaded from the store).
    pub fn with_existing(namespace: &str, flows: Vec<SyntheticFlow>) -> Self {
        let known = flows
            .into_iter()
            .map(|flow| (flow.code.clone(), flow))
            .collect();
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(FactoryState {
                known,
                pending: Vec::new(),
            }),
        }
    }

    /// Returns the namespace (database name) synthetic flows live in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the key of the synthetic flow for `(name, categories, unit)`,
    /// creating it when no flow with that fingerprint exists yet.
    ///
    /// The stored flow keeps the name as given and the normalized categories
    /// and unit.
    pub fn get_or_create<S: AsRef<str>>(&self, name: &str, categories: &[S], unit: &str) -> FlowKey {
        let code = fingerprint(name, categories, unit);
        let mut state = self.lock();

        if state.known.contains_key(&code) {
            return FlowKey::new(self.namespace.clone(), code);
        }

        let flow = SyntheticFlow {
            database: self.namespace.clone(),
            code: code.clone(),
            name: name.trim().to_string(),
            categories: normalize_categories(categories),
            unit: normalize(unit),
            flow_type: SYNTHETIC_FLOW_TYPE.to_string(),
        };
        debug!(name = %flow.name, code = %code, "created synthetic flow");
        state.known.insert(code.clone(), flow);
        state.pending.push(code.clone());

        FlowKey::new(self.namespace.clone(), code)
    }

    /// Looks up a known flow by code.
    pub fn get(&self, code: &str) -> Option<SyntheticFlow> {
        self.lock().known.get(code).cloned()
    }

    /// Flows created since the last commit, in creation order.
    pub fn pending(&self) -> Vec<SyntheticFlow> {
        let state = self.lock();
        state
            .pending
            .iter()
            .filter_map(|code| state.known.get(code).cloned())
            .collect()
    }

    /// Number of flows created since the last commit.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Marks pending flows as persisted.
    pub fn mark_committed(&self) {
        self.lock().pending.clear();
    }

    /// Forgets pending flows after a rejected batch so they are not reused
    /// by later batches without having been persisted.
    pub fn discard_pending(&self) {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        for code in pending {
            state.known.remove(&code);
        }
    }

    /// Total number of known flows, persisted or pending.
    pub fn len(&self) -> usize {
        self.lock().known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
