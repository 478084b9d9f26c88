use lci_relink::errors::RelinkError;
use lci_relink::types::*;
use lci_relink::validate::{validate_batch, validate_dataset};

fn linked(kind: ExchangeKind, amount: f64, database: &str, code: &str) -> Exchange {
    Exchange {
        input: Some(FlowKey::new(database, code)),
        name: Some("flow".to_string()),
        ..Exchange::new(kind, amount)
    }
}

fn dataset(database: &str, code: &str, exchanges: Vec<Exchange>) -> Dataset {
    Dataset {
        database: database.to_string(),
        code: code.to_string(),
        name: "zinc smelting".to_string(),
        reference_product: Some("zinc".to_string()),
        location: Some("CN".to_string()),
        comment: Some(String::new()),
        description: None,
        exchanges,
    }
}

fn valid_dataset() -> Dataset {
    dataset(
        "m1",
        "p1",
        vec![
            linked(ExchangeKind::Production, 1.0, "m1", "p1"),
            linked(ExchangeKind::Technosphere, 0.3, "ecoinvent 3.10 cutoff", "elec"),
            linked(ExchangeKind::Biosphere, 1e-3, "biosphere3", "abc"),
        ],
    )
}

#[test]
fn test_valid_dataset_passes() {
    validate_batch(&[valid_dataset()]).expect("dataset should be valid");
}

#[test]
fn test_production_self_reference_is_enforced() {
    let ds = dataset("m1", "p1", vec![linked(ExchangeKind::Production, 1.0, "m1", "p2")]);
    let err = validate_dataset(&ds).unwrap_err();
    match &err {
        RelinkError::ProductionSelfReference {
            dataset,
            expected,
            found,
            ..
        } => {
            assert_eq!(dataset, "m1/p1");
            assert_eq!(expected, "m1, p1");
            assert_eq!(found, "m1, p2");
        }
        other => panic!("expected ProductionSelfReference, got {other:?}"),
    }
    assert!(err.is_data_error());
}

#[test]
fn test_nan_and_infinite_amounts_are_rejected() {
    for amount in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let mut ds = valid_dataset();
        ds.exchanges[2].amount = amount;
        let err = validate_dataset(&ds).unwrap_err();
        assert!(
            matches!(err, RelinkError::NonNumericAmount { .. }),
            "amount {amount} should be rejected, got {err:?}"
        );
    }
}

#[test]
fn test_missing_input_is_reported_with_exchange() {
    let mut ds = valid_dataset();
    ds.exchanges[1].input = None;
    let err = validate_dataset(&ds).unwrap_err();
    match err {
        RelinkError::MissingField {
            dataset,
            exchange,
            field,
        } => {
            assert_eq!(dataset, "m1/p1");
            assert_eq!(exchange, "#1 technosphere 'flow'");
            assert_eq!(field, "input");
        }
        other => panic!("expected MissingField, got {other:?}"),
    }
}

#[test]
fn test_empty_input_component_is_invalid_shape() {
    let mut ds = valid_dataset();
    ds.exchanges[2].input = Some(FlowKey::new("biosphere3", ""));
    let err = validate_dataset(&ds).unwrap_err();
    assert!(matches!(err, RelinkError::InvalidInputShape { .. }));
}

#[test]
fn test_first_invalid_dataset_fails_whole_batch() {
    let mut broken = valid_dataset();
    broken.code = "p9".to_string();
    let err = validate_batch(&[valid_dataset(), broken, valid_dataset()]).unwrap_err();
    assert!(err.to_string().contains("m1/p9"));
}
