use std::collections::BTreeSet;
use std::path::Path;

use serde_json::{Map, Value};

use crate::errors::{RelinkError, Result};
use crate::types::*;

/// Separator of the `"database::code"` string form of an exchange input.
pub const INPUT_SEPARATOR: &str = "::";

/// Reads a batch file: a JSON array of dataset records, or an object whose
/// `datasets` field holds that array.
pub fn read_batch_file(path: &Path) -> Result<Vec<Value>> {
    let contents = std::fs::read_to_string(path).map_err(|e| RelinkError::Input {
        message: format!("failed to read batch file: {e}"),
        path: path.display().to_string(),
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|e| RelinkError::Input {
        message: format!("failed to parse batch file: {e}"),
        path: path.display().to_string(),
    })?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut obj) => match obj.remove("datasets") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(RelinkError::Input {
                message: "expected an array of datasets or an object with a 'datasets' array"
                    .to_string(),
                path: path.display().to_string(),
            }),
        },
        _ => Err(RelinkError::Input {
            message: "expected an array of datasets".to_string(),
            path: path.display().to_string(),
        }),
    }
}

/// Materializes raw dataset records into the typed model.
///
/// Besides shape checks this pass converts `"db::code"` string inputs into
/// pairs and replaces null text fields by empty strings; both are counted in
/// `stats`.
pub fn parse_batch(records: &[Value], stats: &mut PreparationStats) -> Result<Vec<Dataset>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| parse_dataset(i, record, stats))
        .collect()
}

fn parse_dataset(position: usize, record: &Value, stats: &mut PreparationStats) -> Result<Dataset> {
    let placeholder = format!("#{position}");
    let Value::Object(obj) = record else {
        return Err(RelinkError::InvalidInputShape {
            dataset: placeholder,
            exchange: "-".to_string(),
            message: format!("dataset is not a record: {record}"),
        });
    };

    let database = required_string(obj, "database", &placeholder)?;
    let code = match string_field(obj, "code").or_else(|| string_field(obj, "identifier")) {
        Some(code) => code,
        None => {
            return Err(RelinkError::MissingField {
                dataset: format!("{database}/?"),
                exchange: "-".to_string(),
                field: "code".to_string(),
            })
        }
    };
    let label = format!("{database}/{code}");

    let comment = sanitized_text(obj, "comment", stats);
    let description = sanitized_text(obj, "description", stats);

    let exchanges = match obj.get("exchanges") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_exchange(&label, i, item, stats))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(RelinkError::InvalidInputShape {
                dataset: label,
                exchange: "-".to_string(),
                message: format!("exchanges must be a list, got {other}"),
            })
        }
    };

    Ok(Dataset {
        database,
        code,
        name: string_field(obj, "name").unwrap_or_default(),
        reference_product: reference_product(obj),
        location: string_field(obj, "location"),
        comment,
        description,
        exchanges,
    })
}

fn parse_exchange(
    dataset: &str,
    position: usize,
    record: &Value,
    stats: &mut PreparationStats,
) -> Result<Exchange> {
    let described = |obj: &Map<String, Value>| match obj.get("name").and_then(Value::as_str) {
        Some(name) => format!("#{position} '{name}'"),
        None => format!("#{position}"),
    };

    let Value::Object(obj) = record else {
        return Err(RelinkError::InvalidInputShape {
            dataset: dataset.to_string(),
            exchange: format!("#{position}"),
            message: format!("exchange is not a record: {record}"),
        });
    };

    let kind = match obj.get("type") {
        None | Some(Value::Null) => {
            return Err(RelinkError::MissingField {
                dataset: dataset.to_string(),
                exchange: described(obj),
                field: "type".to_string(),
            })
        }
        Some(value) => value
            .as_str()
            .and_then(ExchangeKind::from_str)
            .ok_or_else(|| RelinkError::InvalidType {
                dataset: dataset.to_string(),
                exchange: described(obj),
                found: value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
            })?,
    };

    let amount = match obj.get("amount") {
        None => {
            return Err(RelinkError::MissingField {
                dataset: dataset.to_string(),
                exchange: described(obj),
                field: "amount".to_string(),
            })
        }
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| RelinkError::NonNumericAmount {
            dataset: dataset.to_string(),
            exchange: described(obj),
            found: n.to_string(),
        })?,
        Some(other) => {
            return Err(RelinkError::NonNumericAmount {
                dataset: dataset.to_string(),
                exchange: described(obj),
                found: other.to_string(),
            })
        }
    };

    let input = parse_input(obj.get("input"), stats).map_err(|message| {
        RelinkError::InvalidInputShape {
            dataset: dataset.to_string(),
            exchange: described(obj),
            message,
        }
    })?;

    Ok(Exchange {
        kind,
        amount,
        input,
        name: string_field(obj, "name"),
        categories: categories_from_value(obj.get("categories")),
        unit: string_field(obj, "unit"),
        database: string_field(obj, "database"),
        reference_product: reference_product(obj),
        location: string_field(obj, "location"),
        comment: sanitized_text(obj, "comment", stats),
    })
}

/// Accepts `null`, `"db::code"`, `["db", "code"]` or `{"database", "code"}`.
fn parse_input(
    value: Option<&Value>,
    stats: &mut PreparationStats,
) -> std::result::Result<Option<FlowKey>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => match s.split_once(INPUT_SEPARATOR) {
            Some((database, code)) => {
                stats.inputs_normalized += 1;
                Ok(Some(FlowKey::new(database, code)))
            }
            None => Err(format!("input string {s:?} is not of the form 'database::code'")),
        },
        Some(Value::Array(items)) => match items.as_slice() {
            [Value::String(database), Value::String(code)] => {
                Ok(Some(FlowKey::new(database.clone(), code.clone())))
            }
            _ => Err(format!(
                "input must be a pair of two identifiers, got {}",
                Value::Array(items.clone())
            )),
        },
        Some(Value::Object(obj)) => {
            match (
                obj.get("database").and_then(Value::as_str),
                obj.get("code").and_then(Value::as_str),
            ) {
                (Some(database), Some(code)) => Ok(Some(FlowKey::new(database, code))),
                _ => Err("input record must carry 'database' and 'code' strings".to_string()),
            }
        }
        Some(other) => Err(format!("unsupported input value {other}")),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_string(obj: &Map<String, Value>, key: &str, dataset: &str) -> Result<String> {
    string_field(obj, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RelinkError::MissingField {
            dataset: dataset.to_string(),
            exchange: "-".to_string(),
            field: key.to_string(),
        })
}

fn reference_product(obj: &Map<String, Value>) -> Option<String> {
    string_field(obj, "reference product").or_else(|| string_field(obj, "reference_product"))
}

/// A text field that is present but null becomes `""` and is counted.
fn sanitized_text(obj: &Map<String, Value>, key: &str, stats: &mut PreparationStats) -> Option<String> {
    match obj.get(key) {
        Some(Value::Null) => {
            stats.text_fields_sanitized += 1;
            Some(String::new())
        }
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Rewrites references from the background label used in the input files to
/// the actual technosphere database name. Returns the number of rewrites.
pub fn rewrite_background_label(datasets: &mut [Dataset], old_label: &str, new_label: &str) -> usize {
    if old_label == new_label {
        return 0;
    }

    let mut changed = 0;
    for exchange in datasets.iter_mut().flat_map(|d| d.exchanges.iter_mut()) {
        if exchange.database.as_deref() == Some(old_label) {
            exchange.database = Some(new_label.to_string());
            changed += 1;
        }
        if let Some(input) = exchange.input.as_mut() {
            if input.database == old_label {
                input.database = new_label.to_string();
                changed += 1;
            }
        }
    }
    changed
}

/// Counts datasets, exchanges and exchanges still lacking a reference.
pub fn statistics(datasets: &[Dataset]) -> BatchStatistics {
    let exchanges = datasets.iter().map(|d| d.exchanges.len()).sum();
    let unlinked = datasets
        .iter()
        .flat_map(|d| d.exchanges.iter())
        .filter(|e| e.input.is_none())
        .count();
    BatchStatistics {
        datasets: datasets.len(),
        exchanges,
        unlinked,
    }
}

/// Names of the inventory databases the batch writes to.
pub fn database_names(datasets: &[Dataset]) -> BTreeSet<String> {
    datasets.iter().map(|d| d.database.clone()).collect()
}
