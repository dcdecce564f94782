use crate::dns::util::normalize_name;

/// Substring matcher: scans patterns linearly looking for the first one
/// contained anywhere in the (normalized) query name. Intended for small
/// rule sets — large keyword lists belong in the regex matcher instead.
#[derive(Debug, Default, Clone)]
pub struct KeywordMatcher<T> {
    entries: Vec<(String, T)>,
}

impl<T: Clone> KeywordMatcher<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, pattern: &str, value: T) {
        self.entries.push((normalize_name(pattern), value));
    }

    pub fn matches(&self, qname: &str) -> Option<&T> {
        let normalized = normalize_name(qname);
        self.entries
            .iter()
            .find(|(pattern, _)| normalized.contains(pattern.as_str()))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_anywhere_in_name() {
        let mut m = KeywordMatcher::new();
        m.add("ads", 1);
        assert_eq!(m.matches("tracker.ads.example.com"), Some(&1));
        assert_eq!(m.matches("example.com"), None);
    }

    #[test]
    fn first_pattern_added_wins() {
        let mut m = KeywordMatcher::new();
        m.add("a", 1);
        m.add("ads", 2);
        assert_eq!(m.matches("ads.example.com"), Some(&1));
    }
}
