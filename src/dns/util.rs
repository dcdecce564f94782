//! Small free helpers shared across the DNS codec and callers outside it.

/// Normalize a name the way every matcher and cache key in this crate
/// expects: lowercased, trailing dot stripped.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    trimmed.to_lowercase()
}

pub fn is_subdomain_of(name: &str, suffix: &str) -> bool {
    if suffix.is_empty() || suffix == "." {
        return true;
    }
    let name = normalize_name(name);
    let suffix = normalize_name(suffix);
    name == suffix || name.ends_with(&format!(".{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_matches_only_at_label_boundary() {
        assert!(is_subdomain_of("a.b.com", "b.com"));
        assert!(is_subdomain_of("b.com", "b.com"));
        assert!(!is_subdomain_of("zb.com", "b.com"));
    }
}
