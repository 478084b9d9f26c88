use lci_relink::context::{MemoryReferences, RunContext};
use lci_relink::errors::RelinkError;
use lci_relink::index::{BiosphereIndex, FlowCandidate};
use lci_relink::overrides::OverrideTable;
use lci_relink::resolver::{select_candidate, Resolver, TechnosphereOutcome};
use lci_relink::synthetic::{fingerprint, SyntheticFlowFactory};
use lci_relink::types::*;

fn flow(code: &str, name: &str, categories: &[&str], unit: &str) -> ReferenceFlow {
    ReferenceFlow {
        database: "biosphere".to_string(),
        code: Some(code.to_string()),
        name: Some(name.to_string()),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        unit: Some(unit.to_string()),
    }
}

fn process(code: &str, name: &str, product: &str, location: &str) -> ReferenceProcess {
    ReferenceProcess {
        database: String::new(),
        code: Some(code.to_string()),
        name: Some(name.to_string()),
        reference_product: Some(product.to_string()),
        location: Some(location.to_string()),
    }
}

fn biosphere_exchange(name: &str, categories: &[&str], unit: &str) -> Exchange {
    Exchange {
        name: Some(name.to_string()),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        unit: Some(unit.to_string()),
        ..Exchange::new(ExchangeKind::Biosphere, 1.0)
    }
}

fn technosphere_exchange(database: &str, name: &str, product: &str, location: &str) -> Exchange {
    Exchange {
        database: Some(database.to_string()),
        name: Some(name.to_string()),
        reference_product: Some(product.to_string()),
        location: Some(location.to_string()),
        unit: Some("kWh".to_string()),
        ..Exchange::new(ExchangeKind::Technosphere, 2.5)
    }
}

fn dataset(database: &str, code: &str, exchanges: Vec<Exchange>) -> Dataset {
    let mut production = Exchange::new(ExchangeKind::Production, 1.0);
    production.input = Some(FlowKey::new(database, code));
    let mut all = vec![production];
    all.extend(exchanges);
    Dataset {
        database: database.to_string(),
        code: code.to_string(),
        name: "copper refining".to_string(),
        reference_product: Some("copper".to_string()),
        location: Some("GLO".to_string()),
        comment: None,
        description: None,
        exchanges: all,
    }
}

/// Reference data shared by most tests: carbon dioxide in air, a zinc pair
/// differing only by compartment, and one technosphere database.
fn references() -> MemoryReferences {
    MemoryReferences::new()
        .with_flows(
            "biosphere",
            vec![
                flow("abc", "Carbon dioxide", &["air"], "kg"),
                flow("zn-w", "Zinc", &["water"], "kg"),
                flow("zn-s", "Zinc", &["soil"], "kg"),
                flow("ch4", "Methane", &["air", "urban air close to ground"], "kg"),
            ],
        )
        .with_processes(
            "ecoinvent 3.10 cutoff",
            vec![process(
                "elec-fr",
                "market for electricity, low voltage",
                "electricity, low voltage",
                "FR",
            )],
        )
}

fn context<'a>(refs: &'a MemoryReferences, overrides: OverrideTable, allow_synthetic: bool) -> RunContext<'a> {
    RunContext::new(
        refs,
        BiosphereIndex::build(refs.flows("biosphere")),
        overrides,
        SyntheticFlowFactory::new("biosphere_custom"),
        allow_synthetic,
    )
}

#[test]
fn test_exact_match() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Carbon dioxide", &["air"], "kg");
    let resolved = resolver.resolve_biosphere("m1/p1", &exc).unwrap();
    assert_eq!(
        resolved,
        Some((FlowKey::new("biosphere", "abc"), ResolutionStage::Exact))
    );
}

#[test]
fn test_mapped_exact_match() {
    let refs = references();
    let overrides = OverrideTable::from_pairs([("carbon dioxide, fossil", "Carbon dioxide")]);
    let ctx = context(&refs, overrides, false);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Carbon dioxide, fossil", &["air"], "kg");
    let resolved = resolver.resolve_biosphere("m1/p1", &exc).unwrap();
    assert_eq!(
        resolved,
        Some((FlowKey::new("biosphere", "abc"), ResolutionStage::MappedExact))
    );
}

#[test]
fn test_name_only_cross_compartment() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let resolver = Resolver::new(&ctx);

    // Sub-compartment differs, so stage A misses; the name is unique.
    let exc = biosphere_exchange("Methane", &["air", "high population density"], "kg");
    let resolved = resolver.resolve_biosphere("m1/p1", &exc).unwrap();
    assert_eq!(
        resolved,
        Some((FlowKey::new("biosphere", "ch4"), ResolutionStage::NameOnly))
    );
}

#[test]
fn test_name_only_top_category_disambiguates() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Zinc", &["soil", "agricultural"], "kg");
    let resolved = resolver.resolve_biosphere("m1/p1", &exc).unwrap();
    assert_eq!(
        resolved,
        Some((FlowKey::new("biosphere", "zn-s"), ResolutionStage::NameOnly))
    );
}

#[test]
fn test_ambiguous_name_without_category_is_not_guessed() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Zinc", &[], "kg");
    let err = resolver.resolve_biosphere("m1/p1", &exc).unwrap_err();
    match err {
        RelinkError::UnresolvedReference {
            dataset,
            name,
            mapped_to,
            unit,
            ..
        } => {
            assert_eq!(dataset, "m1/p1");
            assert_eq!(name, "Zinc");
            assert_eq!(mapped_to, "Zinc");
            assert_eq!(unit, "kg");
        }
        other => panic!("expected UnresolvedReference, got {other:?}"),
    }
}

#[test]
fn test_ambiguous_name_falls_through_to_synthetic() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), true);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Zinc", &[], "kg");
    let (key, stage) = resolver.resolve_biosphere("m1/p1", &exc).unwrap().unwrap();
    assert_eq!(stage, ResolutionStage::Synthetic);
    assert_eq!(key.database, "biosphere_custom");
}

#[test]
fn test_synthetic_fallback_is_stable() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), true);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Unknown Pollutant X", &["soil"], "kg");
    let (first, stage) = resolver.resolve_biosphere("m1/p1", &exc).unwrap().unwrap();
    let (second, _) = resolver.resolve_biosphere("m1/p2", &exc).unwrap().unwrap();

    assert_eq!(stage, ResolutionStage::Synthetic);
    assert_eq!(first, second);
    assert_eq!(first.code, fingerprint("Unknown Pollutant X", &["soil"], "kg"));
    assert_eq!(ctx.synthetic.len(), 1);
}

#[test]
fn test_unresolved_without_synthetic_names_everything() {
    let refs = references();
    let overrides = OverrideTable::from_pairs([("unknown pollutant x", "Pollutant X")]);
    let ctx = context(&refs, overrides, false);
    let resolver = Resolver::new(&ctx);

    let exc = biosphere_exchange("Unknown Pollutant X", &["soil"], "kg");
    let err = resolver.resolve_biosphere("m1/p1", &exc).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown Pollutant X"));
    assert!(message.contains("Pollutant X"));
    assert!(message.contains("soil"));
    assert!(message.contains("m1/p1"));
}

#[test]
fn test_biosphere_without_unit_is_left_alone() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let resolver = Resolver::new(&ctx);

    let mut exc = biosphere_exchange("Carbon dioxide", &["air"], "kg");
    exc.unit = None;
    assert_eq!(resolver.resolve_biosphere("m1/p1", &exc).unwrap(), None);
}

#[test]
fn test_technosphere_lookup_and_skips() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let mut resolver = Resolver::new(&ctx);

    let hit = technosphere_exchange(
        "ecoinvent 3.10 cutoff",
        "market for electricity, low voltage",
        "electricity, low voltage",
        "FR",
    );
    assert_eq!(
        resolver.resolve_technosphere(&hit).unwrap(),
        TechnosphereOutcome::Linked(FlowKey::new("ecoinvent 3.10 cutoff", "elec-fr"))
    );

    let miss = technosphere_exchange(
        "ecoinvent 3.10 cutoff",
        "market for electricity, low voltage",
        "electricity, low voltage",
        "DE",
    );
    assert_eq!(resolver.resolve_technosphere(&miss).unwrap(), TechnosphereOutcome::Unmatched);

    let unknown_db = technosphere_exchange("ecoinvent 3.9", "x", "y", "FR");
    assert_eq!(resolver.resolve_technosphere(&unknown_db).unwrap(), TechnosphereOutcome::Skipped);

    let mut incomplete = hit.clone();
    incomplete.location = Some(String::new());
    assert_eq!(resolver.resolve_technosphere(&incomplete).unwrap(), TechnosphereOutcome::Skipped);

    assert_eq!(
        resolver.cached_databases(),
        vec!["ecoinvent 3.10 cutoff", "ecoinvent 3.9"]
    );
}

#[test]
fn test_resolve_batch_counts_per_stage() {
    let refs = references();
    let overrides = OverrideTable::from_pairs([("carbon dioxide, fossil", "Carbon dioxide")]);
    let ctx = context(&refs, overrides, true);
    let mut resolver = Resolver::new(&ctx);

    let mut already_linked = biosphere_exchange("Whatever", &["air"], "kg");
    already_linked.input = Some(FlowKey::new("biosphere", "preset"));

    let mut batch = vec![dataset(
        "m1",
        "p1",
        vec![
            biosphere_exchange("Carbon dioxide", &["air"], "kg"),
            biosphere_exchange("Carbon dioxide, fossil", &["air"], "kg"),
            biosphere_exchange("Zinc", &["water"], "kg"),
            biosphere_exchange("Zinc", &["water", "ground-"], "kg"),
            biosphere_exchange("Unknown Pollutant X", &["soil"], "kg"),
            technosphere_exchange(
                "ecoinvent 3.10 cutoff",
                "market for electricity, low voltage",
                "electricity, low voltage",
                "FR",
            ),
            technosphere_exchange("elsewhere", "a", "b", "c"),
            already_linked,
        ],
    )];

    let stats = resolver.resolve_batch(&mut batch).unwrap();
    assert_eq!(stats.biosphere_exact, 2);
    assert_eq!(stats.biosphere_mapped, 1);
    assert_eq!(stats.biosphere_name_only, 1);
    assert_eq!(stats.biosphere_synthetic, 1);
    assert_eq!(stats.biosphere_linked(), 5);
    assert_eq!(stats.technosphere_linked, 1);
    assert_eq!(stats.technosphere_skipped, 1);

    let exchanges = &batch[0].exchanges;
    assert_eq!(exchanges[3].input, Some(FlowKey::new("biosphere", "zn-w")));
    assert_eq!(exchanges[7].input, None);
    assert_eq!(exchanges[8].input, Some(FlowKey::new("biosphere", "preset")));
}

#[test]
fn test_resolve_batch_aborts_on_first_unresolved() {
    let refs = references();
    let ctx = context(&refs, OverrideTable::new(), false);
    let mut resolver = Resolver::new(&ctx);

    let mut batch = vec![dataset(
        "m1",
        "p1",
        vec![
            biosphere_exchange("Unknown Pollutant X", &["soil"], "kg"),
            biosphere_exchange("Carbon dioxide", &["air"], "kg"),
        ],
    )];

    let err = resolver.resolve_batch(&mut batch).unwrap_err();
    assert!(matches!(err, RelinkError::UnresolvedReference { .. }));
    assert_eq!(batch[0].exchanges[2].input, None, "resolution stops at the failure");
}

// ---------------------------------------------------------------------------
// Candidate selection
// ---------------------------------------------------------------------------

fn candidate(code: &str, categories: &[&str], unit: &str) -> FlowCandidate {
    FlowCandidate {
        key: FlowKey::new("biosphere", code),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        unit: unit.to_string(),
    }
}

#[test]
fn test_select_prefers_unit_match() {
    let cands = vec![candidate("a", &["air"], "kg"), candidate("b", &["air"], "m3")];
    assert_eq!(select_candidate(&cands, "m3", None), Some(FlowKey::new("biosphere", "b")));
}

#[test]
fn test_select_keeps_all_when_no_unit_matches() {
    let cands = vec![candidate("a", &["air"], "kg"), candidate("b", &["water"], "kg")];
    assert_eq!(select_candidate(&cands, "g", None), None);
    assert_eq!(
        select_candidate(&cands, "g", Some("water")),
        Some(FlowKey::new("biosphere", "b"))
    );
}

#[test]
fn test_select_multiple_top_category_matches_is_ambiguous() {
    let cands = vec![
        candidate("a", &["air", "urban"], "kg"),
        candidate("b", &["air", "rural"], "kg"),
    ];
    assert_eq!(select_candidate(&cands, "kg", Some("air")), None);
}

#[test]
fn test_select_unmatched_category_falls_back_to_unit_set() {
    let cands = vec![candidate("a", &["air"], "kg"), candidate("b", &["air"], "m3")];
    assert_eq!(
        select_candidate(&cands, "kg", Some("soil")),
        Some(FlowKey::new("biosphere", "a"))
    );
    assert_eq!(select_candidate(&[], "kg", Some("soil")), None);
}
