use lci_relink::db::{CommitRequest, Database, DatabaseKind};
use lci_relink::types::*;
use tempfile::TempDir;

/// Helper: create a temp store and return (Database, TempDir).
/// The TempDir is returned so that it stays alive for the duration of the test.
fn setup_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("test.db");
    let db = Database::initialize(&db_path).expect("failed to initialize database");
    (db, dir)
}

fn sample_flow(code: &str, name: &str) -> ReferenceFlow {
    ReferenceFlow {
        database: String::new(),
        code: Some(code.to_string()),
        name: Some(name.to_string()),
        categories: vec!["air".to_string(), "urban air close to ground".to_string()],
        unit: Some("kilogram".to_string()),
    }
}

fn sample_dataset(database: &str, code: &str) -> Dataset {
    let mut production = Exchange::new(ExchangeKind::Production, 1.0);
    production.input = Some(FlowKey::new(database, code));
    let emission = Exchange {
        input: Some(FlowKey::new("biosphere_custom", "f00d")),
        name: Some("Unknown Pollutant X".to_string()),
        categories: vec!["soil".to_string()],
        unit: Some("kg".to_string()),
        comment: Some(String::new()),
        ..Exchange::new(ExchangeKind::Biosphere, 0.25)
    };
    Dataset {
        database: database.to_string(),
        code: code.to_string(),
        name: "nickel refining".to_string(),
        reference_product: Some("nickel".to_string()),
        location: Some("RER".to_string()),
        comment: Some(String::new()),
        description: None,
        exchanges: vec![production, emission],
    }
}

fn synthetic(code: &str) -> SyntheticFlow {
    SyntheticFlow {
        database: "biosphere_custom".to_string(),
        code: code.to_string(),
        name: "Unknown Pollutant X".to_string(),
        categories: vec!["soil".to_string()],
        unit: "kg".to_string(),
        flow_type: SYNTHETIC_FLOW_TYPE.to_string(),
    }
}

#[test]
fn test_initialize_creates_database() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("subdir").join("relink.db");
    let _db = Database::initialize(&db_path).expect("failed to initialize database");
    assert!(db_path.exists(), "database file should exist after initialize");

    let reopened = Database::open(&db_path).expect("failed to reopen");
    assert!(reopened.list_databases().unwrap().is_empty());
}

#[test]
fn test_open_missing_store_fails() {
    let dir = TempDir::new().unwrap();
    assert!(Database::open(&dir.path().join("missing.db")).is_err());
}

#[test]
fn test_replace_and_get_flows() {
    let (db, _dir) = setup_db();
    let flows = vec![
        sample_flow("co2", "Carbon dioxide"),
        sample_flow("ch4", "Methane"),
        sample_flow("co2", "Duplicate code"),
    ];

    let inserted = db.replace_flows("biosphere3", &flows).expect("failed to load flows");
    assert_eq!(inserted, 2);
    assert_eq!(db.database_kind("biosphere3").unwrap(), Some(DatabaseKind::Biosphere));

    let fetched = db.get_flows("biosphere3").unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].database, "biosphere3");
    assert_eq!(fetched[0].name.as_deref(), Some("Carbon dioxide"));
    assert_eq!(fetched[0].categories, vec!["air", "urban air close to ground"]);

    db.replace_flows("biosphere3", &flows[1..2]).unwrap();
    assert_eq!(db.get_flows("biosphere3").unwrap().len(), 1);
}

#[test]
fn test_replace_and_get_processes() {
    let (db, _dir) = setup_db();
    let processes = vec![ReferenceProcess {
        database: String::new(),
        code: Some("elec".to_string()),
        name: Some("market for electricity, low voltage".to_string()),
        reference_product: Some("electricity, low voltage".to_string()),
        location: Some("FR".to_string()),
    }];

    db.replace_processes("ecoinvent", &processes).unwrap();
    let fetched = db.get_processes("ecoinvent").unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].database, "ecoinvent");
    assert_eq!(fetched[0].location.as_deref(), Some("FR"));
    assert!(db.has_database("ecoinvent").unwrap());
}

#[test]
fn test_ensure_database_rejects_kind_change() {
    let (db, _dir) = setup_db();
    db.ensure_database("biosphere_custom", DatabaseKind::Synthetic).unwrap();
    db.ensure_database("biosphere_custom", DatabaseKind::Synthetic).unwrap();
    assert!(db
        .ensure_database("biosphere_custom", DatabaseKind::Inventory)
        .is_err());
}

#[test]
fn test_commit_batch_round_trip() {
    let (db, _dir) = setup_db();
    let datasets = vec![sample_dataset("m1", "p1"), sample_dataset("m1", "p2")];
    let flows = vec![synthetic("f00d")];

    db.commit_batch(&CommitRequest {
        replace: &[],
        synthetic_flows: &flows,
        datasets: &datasets,
    })
    .expect("commit should succeed");

    let stored = db.get_datasets("m1").unwrap();
    assert_eq!(stored, datasets);
    assert_eq!(db.get_synthetic_flows("biosphere_custom").unwrap(), flows);
    assert_eq!(db.database_kind("m1").unwrap(), Some(DatabaseKind::Inventory));
    assert_eq!(
        db.database_kind("biosphere_custom").unwrap(),
        Some(DatabaseKind::Synthetic)
    );
}

#[test]
fn test_commit_batch_replaces_inventory() {
    let (db, _dir) = setup_db();
    let first = vec![sample_dataset("m1", "p1"), sample_dataset("m1", "p2")];
    db.commit_batch(&CommitRequest {
        replace: &[],
        synthetic_flows: &[],
        datasets: &first,
    })
    .unwrap();

    let second = vec![sample_dataset("m1", "p3")];
    db.commit_batch(&CommitRequest {
        replace: &["m1".to_string()],
        synthetic_flows: &[],
        datasets: &second,
    })
    .unwrap();

    let stored = db.get_datasets("m1").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].code, "p3");
    assert_eq!(db.get_stats().unwrap().exchange_count, 2);
}

#[test]
fn test_failed_commit_writes_nothing() {
    let (db, _dir) = setup_db();
    let mut broken = sample_dataset("m1", "p2");
    broken.exchanges[1].input = None;
    let datasets = vec![sample_dataset("m1", "p1"), broken];
    let flows = vec![synthetic("f00d")];

    let result = db.commit_batch(&CommitRequest {
        replace: &[],
        synthetic_flows: &flows,
        datasets: &datasets,
    });

    assert!(result.is_err());
    assert!(!db.has_database("m1").unwrap());
    assert!(db.get_synthetic_flows("biosphere_custom").unwrap().is_empty());
    assert_eq!(db.get_stats().unwrap().dataset_count, 0);
}

#[test]
fn test_synthetic_flow_insert_is_idempotent() {
    let (db, _dir) = setup_db();
    let flows = vec![synthetic("f00d")];
    for code in ["p1", "p2"] {
        db.commit_batch(&CommitRequest {
            replace: &[],
            synthetic_flows: &flows,
            datasets: &[sample_dataset(&format!("m-{code}"), code)],
        })
        .unwrap();
    }
    assert_eq!(db.get_synthetic_flows("biosphere_custom").unwrap().len(), 1);
}

#[test]
fn test_delete_database_cascades() {
    let (db, _dir) = setup_db();
    db.commit_batch(&CommitRequest {
        replace: &[],
        synthetic_flows: &[],
        datasets: &[sample_dataset("m1", "p1")],
    })
    .unwrap();

    assert!(db.delete_database("m1").unwrap());
    assert!(!db.delete_database("m1").unwrap());
    let stats = db.get_stats().unwrap();
    assert_eq!(stats.dataset_count, 0);
    assert_eq!(stats.exchange_count, 0);
}

#[test]
fn test_in_memory_store_has_schema() {
    let db = Database::in_memory().expect("in-memory store");
    db.ensure_database("biosphere3", DatabaseKind::Biosphere).unwrap();
    assert_eq!(
        db.list_databases().unwrap(),
        vec![("biosphere3".to_string(), DatabaseKind::Biosphere)]
    );
}

#[test]
fn test_commit_rejects_inventory_named_like_synthetic_namespace() {
    let (db, _dir) = setup_db();
    db.ensure_database("biosphere_custom", DatabaseKind::Synthetic).unwrap();

    let result = db.commit_batch(&CommitRequest {
        replace: &[],
        synthetic_flows: &[],
        datasets: &[sample_dataset("biosphere_custom", "p1")],
    });

    assert!(result.is_err());
    assert_eq!(
        db.database_kind("biosphere_custom").unwrap(),
        Some(DatabaseKind::Synthetic)
    );
    assert_eq!(db.get_stats().unwrap().dataset_count, 0);
}

#[test]
fn test_commit_rejects_namespace_shared_with_inventory() {
    let (db, _dir) = setup_db();
    let flows = vec![synthetic("f00d")];

    let result = db.commit_batch(&CommitRequest {
        replace: &[],
        synthetic_flows: &flows,
        datasets: &[sample_dataset("biosphere_custom", "p1")],
    });

    assert!(result.is_err());
    assert!(!db.has_database("biosphere_custom").unwrap());
}
