use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::params;
use rusqlite::OptionalExtension;

use super::connection::Database;
use crate::errors::{RelinkError, Result};
use crate::types::*;

/// Kinds of databases held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    Biosphere,
    Technosphere,
    Synthetic,
    Inventory,
}

#[allow(clippy::should_implement_trait)]
impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Biosphere => "biosphere",
            DatabaseKind::Technosphere => "technosphere",
            DatabaseKind::Synthetic => "synthetic",
            DatabaseKind::Inventory => "inventory",
        }
    }

    pub fn from_str(s: &str) -> Option<DatabaseKind> {
        match s {
            "biosphere" => Some(DatabaseKind::Biosphere),
            "technosphere" => Some(DatabaseKind::Technosphere),
            "synthetic" => Some(DatabaseKind::Synthetic),
            "inventory" => Some(DatabaseKind::Inventory),
            _ => None,
        }
    }
}

/// Everything one batch writes, applied in a single transaction.
#[derive(Debug)]
pub struct CommitRequest<'a> {
    /// Inventory databases to delete before writing.
    pub replace: &'a [String],
    /// Synthetic flows created while resolving this batch.
    pub synthetic_flows: &'a [SyntheticFlow],
    pub datasets: &'a [Dataset],
}

fn db_error(operation: &str, message: String) -> RelinkError {
    RelinkError::Database {
        message,
        operation: operation.to_string(),
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn categories_to_json(categories: &[String]) -> String {
    serde_json::to_string(categories).unwrap_or_else(|_| "[]".to_string())
}

fn categories_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Helper: map a rusqlite row to domain types
// ---------------------------------------------------------------------------

fn row_to_flow(row: &rusqlite::Row) -> rusqlite::Result<ReferenceFlow> {
    let categories: String = row.get("categories")?;
    Ok(ReferenceFlow {
        database: row.get("database")?,
        code: row.get("code")?,
        name: row.get("name")?,
        categories: categories_from_json(&categories),
        unit: row.get("unit")?,
    })
}

fn row_to_synthetic(row: &rusqlite::Row) -> rusqlite::Result<SyntheticFlow> {
    let categories: String = row.get("categories")?;
    Ok(SyntheticFlow {
        database: row.get("database")?,
        code: row.get("code")?,
        name: row.get::<_, Option<String>>("name")?.unwrap_or_default(),
        categories: categories_from_json(&categories),
        unit: row.get::<_, Option<String>>("unit")?.unwrap_or_default(),
        flow_type: row
            .get::<_, Option<String>>("flow_type")?
            .unwrap_or_else(|| SYNTHETIC_FLOW_TYPE.to_string()),
    })
}

fn row_to_process(row: &rusqlite::Row) -> rusqlite::Result<ReferenceProcess> {
    Ok(ReferenceProcess {
        database: row.get("database")?,
        code: row.get("code")?,
        name: row.get("name")?,
        reference_product: row.get("reference_product")?,
        location: row.get("location")?,
    })
}

fn row_to_exchange(row: &rusqlite::Row) -> rusqlite::Result<Exchange> {
    let kind_str: String = row.get("kind")?;
    let categories: String = row.get("categories")?;
    Ok(Exchange {
        kind: ExchangeKind::from_str(&kind_str).unwrap_or(ExchangeKind::Technosphere),
        amount: row.get("amount")?,
        input: Some(FlowKey::new(
            row.get::<_, String>("input_database")?,
            row.get::<_, String>("input_code")?,
        )),
        name: row.get("name")?,
        categories: categories_from_json(&categories),
        unit: row.get("unit")?,
        database: row.get("source_database")?,
        reference_product: row.get("reference_product")?,
        location: row.get("location")?,
        comment: row.get("comment")?,
    })
}

// ---------------------------------------------------------------------------
// Database registry
// ---------------------------------------------------------------------------

impl Database {
    /// Registers `name` with `kind`, or checks that an existing registration
    /// has the same kind.
    pub fn ensure_database(&self, name: &str, kind: DatabaseKind) -> Result<()> {
        match self.database_kind(name)? {
            Some(existing) if existing == kind => Ok(()),
            Some(existing) => Err(db_error(
                "ensure_database",
                format!(
                    "database '{name}' is registered as {} and cannot be used as {}",
                    existing.as_str(),
                    kind.as_str()
                ),
            )),
            None => {
                self.conn()
                    .execute(
                        "INSERT INTO databases (name, kind, created_at) VALUES (?1, ?2, ?3)",
                        params![name, kind.as_str(), current_timestamp()],
                    )
                    .map_err(|e| {
                        db_error("ensure_database", format!("failed to register database: {e}"))
                    })?;
                Ok(())
            }
        }
    }

    /// Returns the kind of a registered database, or `None` if unknown.
    pub fn database_kind(&self, name: &str) -> Result<Option<DatabaseKind>> {
        let kind: Option<String> = self
            .conn()
            .query_row(
                "SELECT kind FROM databases WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("database_kind", format!("failed to look up database: {e}")))?;
        Ok(kind.as_deref().and_then(DatabaseKind::from_str))
    }

    /// Returns `true` if a database with this name is registered.
    pub fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self.database_kind(name)?.is_some())
    }

    /// Lists all registered databases, sorted by name.
    pub fn list_databases(&self) -> Result<Vec<(String, DatabaseKind)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT name, kind FROM databases ORDER BY name")
            .map_err(|e| db_error("list_databases", format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| db_error("list_databases", format!("failed to query databases: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let (name, kind) =
                row.map_err(|e| db_error("list_databases", format!("failed to read row: {e}")))?;
            if let Some(kind) = DatabaseKind::from_str(&kind) {
                out.push((name, kind));
            }
        }
        Ok(out)
    }

    /// Deletes a database and everything it owns. Returns `false` if it did
    /// not exist.
    pub fn delete_database(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM databases WHERE name = ?1", params![name])
            .map_err(|e| db_error("delete_database", format!("failed to delete database: {e}")))?;
        Ok(deleted > 0)
    }
}

// ---------------------------------------------------------------------------
// Reference collections
// ---------------------------------------------------------------------------

impl Database {
    /// Replaces the content of a biosphere collection with `flows`.
    ///
    /// Records with a duplicate code are ignored after the first.
    pub fn replace_flows(&self, database: &str, flows: &[ReferenceFlow]) -> Result<usize> {
        let tx = self
            .conn()
            .unchecked_transaction()
            .map_err(|e| db_error("replace_flows", format!("failed to begin transaction: {e}")))?;

        tx.execute("DELETE FROM databases WHERE name = ?1", params![database])
            .map_err(|e| db_error("replace_flows", format!("failed to clear database: {e}")))?;
        tx.execute(
            "INSERT INTO databases (name, kind, created_at) VALUES (?1, ?2, ?3)",
            params![database, DatabaseKind::Biosphere.as_str(), current_timestamp()],
        )
        .map_err(|e| db_error("replace_flows", format!("failed to register database: {e}")))?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO flows (database, code, name, categories, unit)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| db_error("replace_flows", format!("failed to prepare statement: {e}")))?;

            for flow in flows {
                inserted += stmt
                    .execute(params![
                        database,
                        flow.code,
                        flow.name,
                        categories_to_json(&flow.categories),
                        flow.unit,
                    ])
                    .map_err(|e| db_error("replace_flows", format!("failed to insert flow: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| db_error("replace_flows", format!("failed to commit transaction: {e}")))?;
        Ok(inserted)
    }

    /// Returns every flow of a biosphere or synthetic database, in insertion order.
    pub fn get_flows(&self, database: &str) -> Result<Vec<ReferenceFlow>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT database, code, name, categories, unit
                 FROM flows WHERE database = ?1 ORDER BY id",
            )
            .map_err(|e| db_error("get_flows", format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![database], row_to_flow)
            .map_err(|e| db_error("get_flows", format!("failed to query flows: {e}")))?;

        let mut flows = Vec::new();
        for row in rows {
            flows.push(row.map_err(|e| db_error("get_flows", format!("failed to read flow row: {e}")))?);
        }
        Ok(flows)
    }

    /// Replaces the content of a technosphere database with `processes`.
    pub fn replace_processes(&self, database: &str, processes: &[ReferenceProcess]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction().map_err(|e| {
            db_error("replace_processes", format!("failed to begin transaction: {e}"))
        })?;

        tx.execute("DELETE FROM databases WHERE name = ?1", params![database])
            .map_err(|e| db_error("replace_processes", format!("failed to clear database: {e}")))?;
        tx.execute(
            "INSERT INTO databases (name, kind, created_at) VALUES (?1, ?2, ?3)",
            params![database, DatabaseKind::Technosphere.as_str(), current_timestamp()],
        )
        .map_err(|e| db_error("replace_processes", format!("failed to register database: {e}")))?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO processes (database, code, name, reference_product, location)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| {
                    db_error("replace_processes", format!("failed to prepare statement: {e}"))
                })?;

            for process in processes {
                inserted += stmt
                    .execute(params![
                        database,
                        process.code,
                        process.name,
                        process.reference_product,
                        process.location,
                    ])
                    .map_err(|e| {
                        db_error("replace_processes", format!("failed to insert process: {e}"))
                    })?;
            }
        }

        tx.commit().map_err(|e| {
            db_error("replace_processes", format!("failed to commit transaction: {e}"))
        })?;
        Ok(inserted)
    }

    /// Returns every process of a technosphere database, in insertion order.
    pub fn get_processes(&self, database: &str) -> Result<Vec<ReferenceProcess>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT database, code, name, reference_product, location
                 FROM processes WHERE database = ?1 ORDER BY id",
            )
            .map_err(|e| db_error("get_processes", format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![database], row_to_process)
            .map_err(|e| db_error("get_processes", format!("failed to query processes: {e}")))?;

        let mut processes = Vec::new();
        for row in rows {
            processes.push(
                row.map_err(|e| db_error("get_processes", format!("failed to read process row: {e}")))?,
            );
        }
        Ok(processes)
    }
}

// ---------------------------------------------------------------------------
// Synthetic namespace
// ---------------------------------------------------------------------------

impl Database {
    /// Returns all synthetic flows stored in `namespace`.
    pub fn get_synthetic_flows(&self, namespace: &str) -> Result<Vec<SyntheticFlow>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT database, code, name, categories, unit, flow_type
                 FROM flows WHERE database = ?1 AND code IS NOT NULL ORDER BY id",
            )
            .map_err(|e| db_error("get_synthetic_flows", format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![namespace], row_to_synthetic)
            .map_err(|e| db_error("get_synthetic_flows", format!("failed to query flows: {e}")))?;

        let mut flows = Vec::new();
        for row in rows {
            flows.push(row.map_err(|e| {
                db_error("get_synthetic_flows", format!("failed to read flow row: {e}"))
            })?);
        }
        Ok(flows)
    }
}

// ---------------------------------------------------------------------------
// Batch commit
// ---------------------------------------------------------------------------

impl Database {
    /// Writes a validated batch atomically: replaced databases are deleted,
    /// the synthetic namespace and inventory databases are registered, new
    /// synthetic flows are inserted (existing fingerprints are kept), and all
    /// datasets with their exchanges are written.
    ///
    /// Any failure rolls the whole request back.
    pub fn commit_batch(&self, request: &CommitRequest<'_>) -> Result<()> {
        let tx = self
            .conn()
            .unchecked_transaction()
            .map_err(|e| db_error("commit_batch", format!("failed to begin transaction: {e}")))?;

        for name in request.replace {
            tx.execute(
                "DELETE FROM databases WHERE name = ?1 AND kind = ?2",
                params![name, DatabaseKind::Inventory.as_str()],
            )
            .map_err(|e| db_error("commit_batch", format!("failed to delete database '{name}': {e}")))?;
        }

        // Registration is kind-checked: a name already held by another kind
        // fails the whole commit.
        let namespaces: BTreeSet<&str> =
            request.synthetic_flows.iter().map(|f| f.database.as_str()).collect();
        for name in namespaces {
            self.ensure_database(name, DatabaseKind::Synthetic)?;
        }
        let inventories: BTreeSet<&str> =
            request.datasets.iter().map(|d| d.database.as_str()).collect();
        for name in inventories {
            self.ensure_database(name, DatabaseKind::Inventory)?;
        }

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO flows (database, code, name, categories, unit, flow_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| db_error("commit_batch", format!("failed to prepare statement: {e}")))?;

            for flow in request.synthetic_flows {
                stmt.execute(params![
                    flow.database,
                    flow.code,
                    flow.name,
                    categories_to_json(&flow.categories),
                    flow.unit,
                    flow.flow_type,
                ])
                .map_err(|e| db_error("commit_batch", format!("failed to insert synthetic flow: {e}")))?;
            }
        }

        {
            let mut insert_dataset = tx
                .prepare_cached(
                    "INSERT INTO datasets
                        (database, code, name, reference_product, location, comment, description)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|e| db_error("commit_batch", format!("failed to prepare statement: {e}")))?;

            let mut insert_exchange = tx
                .prepare_cached(
                    "INSERT INTO exchanges
                        (dataset_database, dataset_code, position, kind, amount,
                         input_database, input_code, name, categories, unit,
                         source_database, reference_product, location, comment)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                )
                .map_err(|e| db_error("commit_batch", format!("failed to prepare statement: {e}")))?;

            for dataset in request.datasets {
                insert_dataset
                    .execute(params![
                        dataset.database,
                        dataset.code,
                        dataset.name,
                        dataset.reference_product,
                        dataset.location,
                        dataset.comment,
                        dataset.description,
                    ])
                    .map_err(|e| {
                        db_error(
                            "commit_batch",
                            format!("failed to insert dataset {}: {e}", dataset.label()),
                        )
                    })?;

                for (position, exchange) in dataset.exchanges.iter().enumerate() {
                    let Some(input) = &exchange.input else {
                        return Err(db_error(
                            "commit_batch",
                            format!(
                                "exchange {} of dataset {} has no input",
                                exchange.describe(position),
                                dataset.label()
                            ),
                        ));
                    };
                    insert_exchange
                        .execute(params![
                            dataset.database,
                            dataset.code,
                            position as i64,
                            exchange.kind.as_str(),
                            exchange.amount,
                            input.database,
                            input.code,
                            exchange.name,
                            categories_to_json(&exchange.categories),
                            exchange.unit,
                            exchange.database,
                            exchange.reference_product,
                            exchange.location,
                            exchange.comment,
                        ])
                        .map_err(|e| {
                            db_error(
                                "commit_batch",
                                format!("failed to insert exchange of {}: {e}", dataset.label()),
                            )
                        })?;
                }
            }
        }

        tx.commit()
            .map_err(|e| db_error("commit_batch", format!("failed to commit transaction: {e}")))
    }

    /// Returns the committed datasets of an inventory database with their
    /// exchanges in original order.
    pub fn get_datasets(&self, database: &str) -> Result<Vec<Dataset>> {
        let mut datasets = {
            let mut stmt = self
                .conn()
                .prepare(
                    "SELECT database, code, name, reference_product, location, comment, description
                     FROM datasets WHERE database = ?1 ORDER BY code",
                )
                .map_err(|e| db_error("get_datasets", format!("failed to prepare query: {e}")))?;

            let rows = stmt
                .query_map(params![database], |row| {
                    Ok(Dataset {
                        database: row.get("database")?,
                        code: row.get("code")?,
                        name: row.get("name")?,
                        reference_product: row.get("reference_product")?,
                        location: row.get("location")?,
                        comment: row.get("comment")?,
                        description: row.get("description")?,
                        exchanges: Vec::new(),
                    })
                })
                .map_err(|e| db_error("get_datasets", format!("failed to query datasets: {e}")))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| db_error("get_datasets", format!("failed to read dataset row: {e}")))?);
            }
            out
        };

        let mut stmt = self
            .conn()
            .prepare(
                "SELECT kind, amount, input_database, input_code, name, categories, unit,
                        source_database, reference_product, location, comment
                 FROM exchanges WHERE dataset_database = ?1 AND dataset_code = ?2
                 ORDER BY position",
            )
            .map_err(|e| db_error("get_datasets", format!("failed to prepare query: {e}")))?;

        for dataset in &mut datasets {
            let rows = stmt
                .query_map(params![dataset.database, dataset.code], row_to_exchange)
                .map_err(|e| db_error("get_datasets", format!("failed to query exchanges: {e}")))?;
            for row in rows {
                dataset.exchanges.push(
                    row.map_err(|e| db_error("get_datasets", format!("failed to read exchange row: {e}")))?,
                );
            }
        }

        Ok(datasets)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

impl Database {
    /// Returns aggregate statistics about the store.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<u64> {
            self.conn()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
                .map_err(|e| db_error("get_stats", format!("failed to count {table}: {e}")))
        };

        let databases: BTreeMap<String, String> = self
            .list_databases()?
            .into_iter()
            .map(|(name, kind)| (name, kind.as_str().to_string()))
            .collect();

        Ok(StoreStats {
            databases,
            flow_count: count("flows")?,
            process_count: count("processes")?,
            dataset_count: count("datasets")?,
            exchange_count: count("exchanges")?,
            db_size_bytes: self.size().unwrap_or(0),
        })
    }
}
