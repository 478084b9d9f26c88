use std::collections::HashMap;

use tracing::{debug, info};

use crate::context::RunContext;
use crate::errors::{RelinkError, Result};
use crate::index::{FlowCandidate, ProcessIndex};
use crate::normalize::{normalize, normalize_categories};
use crate::types::*;

/// Outcome of a technosphere lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechnosphereOutcome {
    Linked(FlowKey),
    /// Descriptor incomplete or source database not available.
    Skipped,
    /// The process index has no unique entry for the descriptor.
    Unmatched,
}

/// Picks a single name-only candidate, or `None` when the choice is not unique.
///
/// Candidates are first narrowed to those whose unit equals `unit`; when none
/// match, all candidates stay in play. A `top_category` then selects the
/// unique candidate whose first category equals it; several such candidates
/// are ambiguous. Without a decisive category the narrowed set must contain
/// exactly one candidate.
pub fn select_candidate(
    candidates: &[FlowCandidate],
    unit: &str,
    top_category: Option<&str>,
) -> Option<FlowKey> {
    if candidates.is_empty() {
        return None;
    }

    let by_unit: Vec<&FlowCandidate> = candidates.iter().filter(|c| c.unit == unit).collect();
    let by_unit = if by_unit.is_empty() {
        candidates.iter().collect()
    } else {
        by_unit
    };

    if let Some(top) = top_category.filter(|t| !t.is_empty()) {
        let top = normalize(top);
        let by_top: Vec<&&FlowCandidate> = by_unit
            .iter()
            .filter(|c| c.top_category() == Some(top.as_str()))
            .collect();
        match by_top.as_slice() {
            [only] => return Some(only.key.clone()),
            [] => {}
            _ => return None,
        }
    }

    match by_unit.as_slice() {
        [only] => Some(only.key.clone()),
        _ => None,
    }
}

/// Staged matcher that fills in missing exchange inputs.
///
/// Process indices are built on first use per technosphere database and
/// cached for the lifetime of the resolver. A database found unavailable is
/// cached as such too.
pub struct Resolver<'c, 'a> {
    ctx: &'c RunContext<'a>,
    process_indices: HashMap<String, Option<ProcessIndex>>,
}

impl<'c, 'a> Resolver<'c, 'a> {
    pub fn new(ctx: &'c RunContext<'a>) -> Self {
        Self {
            ctx,
            process_indices: HashMap::new(),
        }
    }

    /// Resolves every exchange lacking an input, in place.
    ///
    /// Stops at the first biosphere exchange that cannot be resolved;
    /// exchanges resolved before the failure keep their inputs, but callers
    /// must treat the batch as rejected.
    pub fn resolve_batch(&mut self, datasets: &mut [Dataset]) -> Result<ResolutionStats> {
        let mut stats = ResolutionStats::default();

        for dataset in datasets.iter_mut() {
            let label = dataset.label();
            for exchange in dataset.exchanges.iter_mut() {
                if exchange.input.is_some() {
                    continue;
                }
                match exchange.kind {
                    ExchangeKind::Production => {}
                    ExchangeKind::Technosphere => match self.resolve_technosphere(exchange)? {
                        TechnosphereOutcome::Linked(key) => {
                            exchange.input = Some(key);
                            stats.technosphere_linked += 1;
                        }
                        TechnosphereOutcome::Skipped => stats.technosphere_skipped += 1,
                        TechnosphereOutcome::Unmatched => stats.technosphere_unmatched += 1,
                    },
                    ExchangeKind::Biosphere => match self.resolve_biosphere(&label, exchange)? {
                        Some((key, stage)) => {
                            debug!(
                                dataset = %label,
                                code = %key.code,
                                stage = stage.as_str(),
                                "linked biosphere exchange"
                            );
                            exchange.input = Some(key);
                            stats.record(stage);
                        }
                        None => stats.biosphere_skipped += 1,
                    },
                }
            }
        }

        info!(
            technosphere = stats.technosphere_linked,
            exact = stats.biosphere_exact,
            mapped = stats.biosphere_mapped,
            name_only = stats.biosphere_name_only,
            synthetic = stats.biosphere_synthetic,
            "resolution finished"
        );
        Ok(stats)
    }

    /// Looks up a technosphere exchange by `(database, name, reference
    /// product, location)`. Never fails on missing data; only store errors
    /// propagate.
    pub fn resolve_technosphere(&mut self, exchange: &Exchange) -> Result<TechnosphereOutcome> {
        let fields = (
            present(&exchange.database),
            present(&exchange.name),
            present(&exchange.reference_product),
            present(&exchange.location),
        );
        let (Some(database), Some(name), Some(product), Some(location)) = fields else {
            return Ok(TechnosphereOutcome::Skipped);
        };

        let Some(index) = self.process_index(database)? else {
            debug!(database, name, "technosphere database unavailable; exchange left unlinked");
            return Ok(TechnosphereOutcome::Skipped);
        };

        Ok(match index.lookup(name, product, location) {
            Some(key) => TechnosphereOutcome::Linked(key.clone()),
            None => TechnosphereOutcome::Unmatched,
        })
    }

    /// Resolves a biosphere exchange through the exact, mapped-exact,
    /// name-only and synthetic stages.
    ///
    /// Returns `Ok(None)` when the exchange has no name or unit to match on,
    /// and [`RelinkError::UnresolvedReference`] when every enabled stage fails.
    pub fn resolve_biosphere(
        &self,
        dataset: &str,
        exchange: &Exchange,
    ) -> Result<Option<(FlowKey, ResolutionStage)>> {
        let (Some(raw_name), Some(unit)) = (&exchange.name, &exchange.unit) else {
            return Ok(None);
        };

        let index = &self.ctx.biosphere;
        let name_n = normalize(raw_name);
        let cats_n = normalize_categories(&exchange.categories);
        let unit_n = normalize(unit);

        if let Some(key) = index.lookup_exact(&name_n, &cats_n, &unit_n) {
            return Ok(Some((key.clone(), ResolutionStage::Exact)));
        }

        let mapped_name = self.ctx.overrides.substitute(raw_name);
        let mapped_n = normalize(mapped_name);
        if mapped_n != name_n {
            if let Some(key) = index.lookup_exact(&mapped_n, &cats_n, &unit_n) {
                return Ok(Some((key.clone(), ResolutionStage::MappedExact)));
            }
        }

        let candidates = index.candidates(mapped_name);
        let top = cats_n.first().map(String::as_str);
        if let Some(key) = select_candidate(&candidates, &unit_n, top) {
            return Ok(Some((key, ResolutionStage::NameOnly)));
        }
        if candidates.len() > 1 {
            debug!(
                dataset,
                name = %raw_name,
                candidates = candidates.len(),
                "name-only match ambiguous"
            );
        }

        if self.ctx.allow_synthetic {
            let key = self
                .ctx
                .synthetic
                .get_or_create(raw_name, &exchange.categories, unit);
            return Ok(Some((key, ResolutionStage::Synthetic)));
        }

        Err(RelinkError::UnresolvedReference {
            dataset: dataset.to_string(),
            name: raw_name.clone(),
            mapped_to: mapped_name.to_string(),
            categories: exchange.categories.clone(),
            unit: unit.clone(),
        })
    }

    /// Returns the process index for `database`, building it on first use.
    /// `None` means the database is not an available reference collection.
    fn process_index(&mut self, database: &str) -> Result<Option<&ProcessIndex>> {
        if !self.process_indices.contains_key(database) {
            let index = if self.ctx.references.has_process_database(database)? {
                let processes = self.ctx.references.processes(database)?;
                let index = ProcessIndex::build(database, &processes);
                debug!(
                    database,
                    entries = index.len(),
                    skipped = index.skipped(),
                    "built process index"
                );
                Some(index)
            } else {
                None
            };
            self.process_indices.insert(database.to_string(), index);
        }
        Ok(self.process_indices.get(database).and_then(Option::as_ref))
    }

    /// Drops the cached index of `database`, e.g. after the database itself
    /// was rewritten between two batches.
    pub fn forget(&mut self, database: &str) {
        self.process_indices.remove(database);
    }

    /// Names of the databases a process index (or an unavailability marker)
    /// has been cached for.
    pub fn cached_databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.process_indices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
