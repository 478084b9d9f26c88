use std::collections::HashMap;

use crate::db::{Database, DatabaseKind};
use crate::errors::Result;
use crate::index::BiosphereIndex;
use crate::overrides::OverrideTable;
use crate::synthetic::SyntheticFlowFactory;
use crate::types::{ReferenceFlow, ReferenceProcess};

/// Read access to technosphere reference data, used to build process indices
/// lazily.
pub trait ReferenceSource {
    /// Whether `database` is a known collection processes can be linked to.
    fn has_process_database(&self, database: &str) -> Result<bool>;

    /// All processes of `database`. Only called when
    /// [`has_process_database`](Self::has_process_database) returned `true`.
    fn processes(&self, database: &str) -> Result<Vec<ReferenceProcess>>;
}

impl ReferenceSource for Database {
    fn has_process_database(&self, database: &str) -> Result<bool> {
        Ok(matches!(
            self.database_kind(database)?,
            Some(DatabaseKind::Technosphere | DatabaseKind::Inventory)
        ))
    }

    /// Inventory databases committed earlier are linkable too; their datasets
    /// act as processes.
    fn processes(&self, database: &str) -> Result<Vec<ReferenceProcess>> {
        match self.database_kind(database)? {
            Some(DatabaseKind::Inventory) => Ok(self
                .get_datasets(database)?
                .into_iter()
                .map(|d| ReferenceProcess {
                    database: d.database,
                    code: Some(d.code),
                    name: Some(d.name),
                    reference_product: d.reference_product,
                    location: d.location,
                })
                .collect()),
            _ => self.get_processes(database),
        }
    }
}

/// In-memory reference collections, keyed by database name.
#[derive(Debug, Default, Clone)]
pub struct MemoryReferences {
    flows: HashMap<String, Vec<ReferenceFlow>>,
    processes: HashMap<String, Vec<ReferenceProcess>>,
}

impl MemoryReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a biosphere collection; each flow's `database` is set to `database`.
    pub fn with_flows(mut self, database: &str, flows: Vec<ReferenceFlow>) -> Self {
        let flows = flows
            .into_iter()
            .map(|f| ReferenceFlow {
                database: database.to_string(),
                ..f
            })
            .collect();
        self.flows.insert(database.to_string(), flows);
        self
    }

    /// Adds a technosphere collection; each process's `database` is set to `database`.
    pub fn with_processes(mut self, database: &str, processes: Vec<ReferenceProcess>) -> Self {
        let processes = processes
            .into_iter()
            .map(|p| ReferenceProcess {
                database: database.to_string(),
                ..p
            })
            .collect();
        self.processes.insert(database.to_string(), processes);
        self
    }

    /// Flows of one biosphere collection.
    pub fn flows(&self, database: &str) -> &[ReferenceFlow] {
        self.flows.get(database).map(Vec::as_slice).unwrap_or_default()
    }
}

impl ReferenceSource for MemoryReferences {
    fn has_process_database(&self, database: &str) -> Result<bool> {
        Ok(self.processes.contains_key(database))
    }

    fn processes(&self, database: &str) -> Result<Vec<ReferenceProcess>> {
        Ok(self.processes.get(database).cloned().unwrap_or_default())
    }
}

/// Everything one run resolves against.
///
/// Built once before resolution starts; the biosphere index and override
/// table are frozen for the lifetime of the context. The synthetic factory is
/// the only component with interior mutability.
pub struct RunContext<'a> {
    pub references: &'a dyn ReferenceSource,
    pub biosphere: BiosphereIndex,
    pub overrides: OverrideTable,
    pub synthetic: SyntheticFlowFactory,
    /// Enables the synthetic-flow fallback stage.
    pub allow_synthetic: bool,
}

impl<'a> RunContext<'a> {
    pub fn new(
        references: &'a dyn ReferenceSource,
        biosphere: BiosphereIndex,
        overrides: OverrideTable,
        synthetic: SyntheticFlowFactory,
        allow_synthetic: bool,
    ) -> Self {
        Self {
            references,
            biosphere,
            overrides,
            synthetic,
            allow_synthetic,
        }
    }
}
