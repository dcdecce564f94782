use rustc_hash::FxHashMap;

use crate::dns::util::normalize_name;

/// Label trie rooted at the TLD. Insert walks labels right-to-left,
/// creating nodes; a query walks right-to-left and remembers the deepest
/// node that carries a value. A root entry (".") matches any name.
#[derive(Debug, Default)]
pub struct SubDomainMatcher<T> {
    root: Node<T>,
    len: usize,
}

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    children: FxHashMap<String, Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: FxHashMap::default(),
        }
    }
}

impl<T: Clone> SubDomainMatcher<T> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }

    pub fn add(&mut self, pattern: &str, value: T) {
        let normalized = normalize_name(pattern);
        if normalized.is_empty() {
            // root entry "." matches everything
            self.root.value = Some(value);
            self.len += 1;
            return;
        }
        let labels: Vec<&str> = normalized.split('.').collect();
        let mut node = &mut self.root;
        for label in labels.iter().rev() {
            node = node.children.entry((*label).to_string()).or_default();
        }
        if node.value.is_none() {
            self.len += 1;
        }
        node.value = Some(value);
    }

    pub fn matches(&self, qname: &str) -> Option<&T> {
        let normalized = normalize_name(qname);
        let labels: Vec<&str> = if normalized.is_empty() {
            vec![]
        } else {
            normalized.split('.').collect()
        };

        let mut node = &self.root;
        let mut deepest = node.value.as_ref();
        for label in labels.iter().rev() {
            match node.children.get(*label) {
                Some(next) => {
                    node = next;
                    if node.value.is_some() {
                        deepest = node.value.as_ref();
                    }
                }
                None => break,
            }
        }
        deepest
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_self_and_descendants_not_siblings() {
        let mut m = SubDomainMatcher::new();
        m.add("b.com", 1);
        assert_eq!(m.matches("a.b.com"), Some(&1));
        assert_eq!(m.matches("b.com"), Some(&1));
        assert_eq!(m.matches("zb.com"), None);
        assert_eq!(m.matches("com"), None);
    }

    #[test]
    fn root_entry_matches_everything() {
        let mut m: SubDomainMatcher<i32> = SubDomainMatcher::new();
        m.add(".", 42);
        assert_eq!(m.matches("anything.at.all"), Some(&42));
    }

    #[test]
    fn deepest_match_wins() {
        let mut m = SubDomainMatcher::new();
        m.add("com", 1);
        m.add("example.com", 2);
        assert_eq!(m.matches("www.example.com"), Some(&2));
        assert_eq!(m.matches("other.com"), Some(&1));
    }
}
