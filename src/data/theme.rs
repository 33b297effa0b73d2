use super::model::ALL;

/// Prefix marking an explicit theme in the raw export field.
pub const THEME_PREFIX: &str = "theme_";

/// Normalise a raw theme field: `"theme_<name>"` → `<name>`, anything else
/// (including a bare prefix with no name) → `"all"`.
pub fn extract_theme(raw: &str) -> String {
    match raw.trim().strip_prefix(THEME_PREFIX) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ALL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_literal_yields_name() {
        assert_eq!(extract_theme("theme_foo"), "foo");
        assert_eq!(extract_theme("theme_access_barriers"), "access_barriers");
    }

    #[test]
    fn bare_literal_yields_sentinel() {
        assert_eq!(extract_theme("bar"), "all");
        assert_eq!(extract_theme("all"), "all");
        assert_eq!(extract_theme(""), "all");
        assert_eq!(extract_theme("theme_"), "all");
    }
}
