use tracing::warn;

use crate::errors::{RelinkError, Result};
use crate::types::{Dataset, Exchange, ExchangeKind};

/// Checks every exchange of the batch and fails on the first violation.
///
/// Record shape, the exchange type tag and JSON amount types are enforced
/// while the batch is parsed; this pass covers what resolution could leave
/// behind:
/// - the amount is a finite number
/// - an input is present and both of its components are non-empty
/// - a production exchange points at its own dataset
pub fn validate_batch(datasets: &[Dataset]) -> Result<()> {
    for dataset in datasets {
        validate_dataset(dataset)?;
    }
    Ok(())
}

/// Validates the exchanges of a single dataset.
pub fn validate_dataset(dataset: &Dataset) -> Result<()> {
    for (position, exchange) in dataset.exchanges.iter().enumerate() {
        validate_exchange(dataset, position, exchange).inspect_err(|e| {
            warn!(dataset = %dataset.label(), error = %e, "validation failed");
        })?;
    }
    Ok(())
}

fn validate_exchange(dataset: &Dataset, position: usize, exchange: &Exchange) -> Result<()> {
    let label = || dataset.label();
    let described = || exchange.describe(position);

    if !exchange.amount.is_finite() {
        return Err(RelinkError::NonNumericAmount {
            dataset: label(),
            exchange: described(),
            found: exchange.amount.to_string(),
        });
    }

    let Some(input) = &exchange.input else {
        return Err(RelinkError::MissingField {
            dataset: label(),
            exchange: described(),
            field: "input".to_string(),
        });
    };

    if input.database.is_empty() || input.code.is_empty() {
        return Err(RelinkError::InvalidInputShape {
            dataset: label(),
            exchange: described(),
            message: format!(
                "input must be a pair of non-empty identifiers, got ({:?}, {:?})",
                input.database, input.code
            ),
        });
    }

    if exchange.kind == ExchangeKind::Production {
        let own = dataset.key();
        if *input != own {
            return Err(RelinkError::ProductionSelfReference {
                dataset: label(),
                exchange: described(),
                expected: own.to_string(),
                found: input.to_string(),
            });
        }
    }

    Ok(())
}
