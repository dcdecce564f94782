use rustc_hash::FxHashMap;

use crate::dns::util::normalize_name;

/// Exact-match domain matcher: a plain hash map lookup.
#[derive(Debug, Default, Clone)]
pub struct FullMatcher<T> {
    entries: FxHashMap<String, T>,
}

impl<T: Clone> FullMatcher<T> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, pattern: &str, value: T) {
        self.entries.insert(normalize_name(pattern), value);
    }

    pub fn matches(&self, qname: &str) -> Option<&T> {
        self.entries.get(&normalize_name(qname))
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
    fn exact_match_only() {
        let mut m = FullMatcher::new();
        m.add("Example.COM.", 1);
        assert_eq!(m.matches("example.com"), Some(&1));
        assert_eq!(m.matches("www.example.com"), None);
    }
}
