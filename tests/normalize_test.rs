use lci_relink::normalize::{normalize, normalize_categories};

#[test]
fn test_normalize_trims_lowercases_and_collapses() {
    assert_eq!(normalize("  Carbon   Dioxide, FOSSIL "), "carbon dioxide, fossil");
    assert_eq!(normalize("Water\t(river)\n"), "water (river)");
}

#[test]
fn test_normalize_is_idempotent() {
    let inputs = [
        "",
        "   ",
        "Carbon dioxide",
        "  Nitrogen   oxides ",
        "Particulate Matter, < 2.5 um",
        "\tMETHANE\u{a0}fossil",
    ];
    for input in inputs {
        let once = normalize(input);
        assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
    }
}

#[test]
fn test_normalize_is_case_and_whitespace_insensitive() {
    let variants = ["carbon dioxide", "Carbon Dioxide", " CARBON\tdioxide ", "carbon  \n dioxide"];
    for v in variants {
        assert_eq!(normalize(v), "carbon dioxide");
    }
}

#[test]
fn test_normalize_categories_preserves_order() {
    let cats = normalize_categories(&["Air".to_string(), " Non-Urban  Air ".to_string()]);
    assert_eq!(cats, vec!["air", "non-urban air"]);
    assert!(normalize_categories::<String>(&[]).is_empty());
}
