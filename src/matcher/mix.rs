use crate::matcher::full::FullMatcher;
use crate::matcher::keyword::KeywordMatcher;
use crate::matcher::regex::RegexMatcher;
use crate::matcher::subdomain::SubDomainMatcher;

/// A rule prefix selecting which underlying matcher an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Full,
    SubDomain,
    Keyword,
    Regexp,
}

impl RuleKind {
    /// Parses a leading `type:` prefix, defaulting to `SubDomain` when
    /// absent — the common case for domain block/allow lists.
    pub fn parse_prefixed(raw: &str) -> (Self, &str) {
        if let Some(rest) = raw.strip_prefix("full:") {
            (Self::Full, rest)
        } else if let Some(rest) = raw.strip_prefix("domain:") {
            (Self::SubDomain, rest)
        } else if let Some(rest) = raw.strip_prefix("keyword:") {
            (Self::Keyword, rest)
        } else if let Some(rest) = raw.strip_prefix("regexp:") {
            (Self::Regexp, rest)
        } else {
            (Self::SubDomain, raw)
        }
    }
}

/// Aggregates the four matcher modes behind one `add`/`matches` surface.
/// Matching order is Full, then SubDomain, then Regex, then Keyword — the
/// cheapest and most specific checks run first.
#[derive(Debug, Clone)]
pub struct MixMatcher<T> {
    full: FullMatcher<T>,
    sub_domain: SubDomainMatcher<T>,
    regex: RegexMatcher<T>,
    keyword: KeywordMatcher<T>,
}

impl<T: Clone> MixMatcher<T> {
    pub fn new() -> Self {
        Self {
            full: FullMatcher::new(),
            sub_domain: SubDomainMatcher::new(),
            regex: RegexMatcher::new(),
            keyword: KeywordMatcher::new(),
        }
    }

    pub fn with_regex_cache_capacity(capacity: usize) -> Self {
        Self {
            full: FullMatcher::new(),
            sub_domain: SubDomainMatcher::new(),
            regex: RegexMatcher::with_cache_capacity(capacity),
            keyword: KeywordMatcher::new(),
        }
    }

    pub fn add(&mut self, raw_rule: &str, value: T) -> Result<(), regex::Error> {
        let (kind, pattern) = RuleKind::parse_prefixed(raw_rule);
        let pattern = pattern.trim();
        match kind {
            RuleKind::Full => self.full.add(pattern, value),
            RuleKind::SubDomain => self.sub_domain.add(pattern, value),
            RuleKind::Keyword => self.keyword.add(pattern, value),
            RuleKind::Regexp => self.regex.add(pattern, value)?,
        }
        Ok(())
    }

    pub fn matches(&mut self, qname: &str) -> Option<&T> {
        if self.full.matches(qname).is_some() {
            self.full.matches(qname)
        } else if self.sub_domain.matches(qname).is_some() {
            self.sub_domain.matches(qname)
        } else if self.regex.matches(qname).is_some() {
            self.regex.matches(qname)
        } else {
            self.keyword.matches(qname)
        }
    }

    pub fn len(&self) -> usize {
        self.full.len() + self.sub_domain.len() + self.regex.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for MixMatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_prefix_and_respects_match_order() {
        let mut m = MixMatcher::new();
        m.add("domain:example.com", "sub").unwrap();
        m.add("full:exact.example.com", "full").unwrap();
        m.add("keyword:ads", "keyword").unwrap();
        m.add("regexp:^track\\.", "regex").unwrap();

        assert_eq!(m.matches("exact.example.com"), Some(&"full"));
        assert_eq!(m.matches("www.example.com"), Some(&"sub"));
        assert_eq!(m.matches("track.example.org"), Some(&"regex"));
        assert_eq!(m.matches("cdn.ads.org"), Some(&"keyword"));
        assert_eq!(m.matches("unrelated.net"), None);
    }

    #[test]
    fn default_prefix_is_subdomain() {
        let mut m = MixMatcher::new();
        m.add("example.com", "v").unwrap();
        assert_eq!(m.matches("a.example.com"), Some(&"v"));
    }
}
