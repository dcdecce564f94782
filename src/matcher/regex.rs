use rand::Rng;
use rustc_hash::FxHashMap;

use crate::dns::util::normalize_name;

/// Regex matcher: patterns are tried in insertion order, first match wins.
/// An optional bounded cache remembers `qname -> Some(pattern_index)` (hit)
/// or `None` (confirmed miss) so repeat lookups skip the regex scan.
#[derive(Debug, Clone)]
pub struct RegexMatcher<T> {
    patterns: Vec<(regex::Regex, T)>,
    cache: Option<Cache>,
}

#[derive(Debug, Clone)]
struct Cache {
    capacity: usize,
    entries: FxHashMap<String, Option<usize>>,
}

impl Cache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: FxHashMap::default(),
        }
    }

    fn get(&self, key: &str) -> Option<Option<usize>> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: String, value: Option<usize>) {
        if self.entries.len() >= self.capacity {
            self.evict_fraction();
        }
        self.entries.insert(key, value);
    }

    /// Evicts roughly 1/8 of entries chosen at random, rather than
    /// maintaining LRU order for what is meant to be a cheap cache.
    fn evict_fraction(&mut self) {
        let to_remove = (self.entries.len() / 8).max(1);
        let mut rng = rand::rng();
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for _ in 0..to_remove {
            if keys.is_empty() {
                break;
            }
            let idx = rng.random_range(0..keys.len());
            self.entries.remove(&keys[idx]);
        }
    }
}

impl<T: Clone> RegexMatcher<T> {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            cache: None,
        }
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            patterns: Vec::new(),
            cache: Some(Cache::new(capacity)),
        }
    }

    /// Compiles and stores `pattern`. Returns an error if the pattern is
    /// not a valid regex.
    pub fn add(&mut self, pattern: &str, value: T) -> Result<(), regex::Error> {
        let compiled = regex::Regex::new(pattern)?;
        self.patterns.push((compiled, value));
        Ok(())
    }

    pub fn matches(&mut self, qname: &str) -> Option<&T> {
        let normalized = normalize_name(qname);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&normalized) {
                return cached.map(|idx| &self.patterns[idx].1);
            }
        }

        let found = self
            .patterns
            .iter()
            .position(|(re, _)| re.is_match(&normalized));

        if let Some(cache) = &mut self.cache {
            cache.insert(normalized, found);
        }

        found.map(|idx| &self.patterns[idx].1)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl<T: Clone> Default for RegexMatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_pattern_wins() {
        let mut m = RegexMatcher::new();
        m.add(r"^ads\.", 1).unwrap();
        m.add(r"example", 2).unwrap();
        assert_eq!(m.matches("ads.example.com"), Some(&1));
        assert_eq!(m.matches("www.example.com"), Some(&2));
        assert_eq!(m.matches("other.org"), None);
    }

    #[test]
    fn cache_serves_repeat_lookups_including_misses() {
        let mut m = RegexMatcher::with_cache_capacity(4);
        m.add(r"^ads\.", 1).unwrap();
        assert_eq!(m.matches("ads.example.com"), Some(&1));
        assert_eq!(m.matches("ads.example.com"), Some(&1));
        assert_eq!(m.matches("safe.example.com"), None);
        assert_eq!(m.matches("safe.example.com"), None);
    }
}
