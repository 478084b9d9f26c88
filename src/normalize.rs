/// Canonicalizes a string for comparison: trims, lowercases, and collapses
/// every internal whitespace run to a single space.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes every element of a category path, preserving order.
pub fn normalize_categories<S: AsRef<str>>(categories: &[S]) -> Vec<String> {
    categories.iter().map(|c| normalize(c.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_mixed_whitespace() {
        assert_eq!(normalize("  Carbon\t\tDIOXIDE \n fossil "), "carbon dioxide fossil");
    }

    #[test]
    fn empty_and_blank_become_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \t\n "), "");
    }

    #[test]
    fn categories_keep_order() {
        let cats = normalize_categories(&["Air", "  Urban Air close to ground "]);
        assert_eq!(cats, vec!["air", "urban air close to ground"]);
    }
}
