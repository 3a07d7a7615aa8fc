//! Label trie for domain rules.
//!
//! Supported patterns:
//! - `example.com` matches only `example.com`
//! - `*.example.com` matches exactly one extra label (`a.example.com`)
//! - `.example.com` matches any number of extra labels, but not `example.com`
//! - `+.example.com` is shorthand for both `example.com` and `.example.com`
//!
//! A `*` label may also appear in the middle of a pattern (`www.*.com`).
//! Exact labels win over `*`, which wins over the `.` wildcard.

use compact_str::CompactString;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use std::collections::HashMap;

const WILDCARD: &str = "*";
const DOT_WILDCARD: &str = "";

#[derive(Debug, Clone)]
struct TrieNode<T> {
    children: HashMap<CompactString, TrieNode<T>, FxBuildHasher>,
    data: Option<T>,
}

impl<T> TrieNode<T> {
    fn new() -> Self {
        Self {
            children: HashMap::with_hasher(FxBuildHasher),
            data: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DomainTrie<T> {
    root: TrieNode<T>,
    len: usize,
}

impl<T> Default for DomainTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

fn valid_parts(domain: &str) -> Option<SmallVec<[&str; 8]>> {
    if domain.is_empty() {
        return None;
    }
    let parts: SmallVec<[&str; 8]> = domain.split('.').collect();
    // only the first label may be empty, and only as the `.` wildcard
    if parts.iter().skip(1).any(|p| p.is_empty()) {
        return None;
    }
    if parts.len() == 1 && parts[0].is_empty() {
        return None;
    }
    Some(parts)
}

impl<T: Clone> DomainTrie<T> {
    /// Inserts `data` under `pattern`. Returns false when the pattern is malformed.
    pub fn insert(&mut self, pattern: &str, data: T) -> bool {
        let pattern = normalize_domain(pattern);
        if let Some(rest) = pattern.strip_prefix("+.") {
            let exact = self.insert_parts(rest, data.clone());
            let dotted = self.insert_parts(&format!(".{}", rest), data);
            return exact && dotted;
        }
        self.insert_parts(&pattern, data)
    }
}

impl<T> DomainTrie<T> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn insert_parts(&mut self, pattern: &str, data: T) -> bool {
        let Some(parts) = valid_parts(pattern) else {
            return false;
        };

        let mut node = &mut self.root;
        for label in parts.iter().rev() {
            node = node
                .children
                .entry(CompactString::new(label))
                .or_insert_with(TrieNode::new);
        }
        if node.data.is_none() {
            self.len += 1;
        }
        node.data = Some(data);
        true
    }

    /// Finds the most specific rule matching `domain`.
    pub fn search(&self, domain: &str) -> Option<&T> {
        let domain = normalize_domain(domain);
        let parts: SmallVec<[&str; 8]> = domain.split('.').rev().collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Self::search_node(&self.root, &parts)
    }

    fn search_node<'a>(node: &'a TrieNode<T>, parts: &[&str]) -> Option<&'a T> {
        let Some((label, rest)) = parts.split_first() else {
            return node.data.as_ref();
        };

        if let Some(child) = node.children.get(*label) {
            if let Some(found) = Self::search_node(child, rest) {
                return Some(found);
            }
        }

        if let Some(child) = node.children.get(WILDCARD) {
            if let Some(found) = Self::search_node(child, rest) {
                return Some(found);
            }
        }

        node.children
            .get(DOT_WILDCARD)
            .and_then(|child| child.data.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(patterns: &[(&str, u32)]) -> DomainTrie<u32> {
        let mut trie = DomainTrie::new();
        for (pattern, value) in patterns {
            assert!(trie.insert(pattern, *value), "rejected {pattern}");
        }
        trie
    }

    #[test]
    fn test_exact_match() {
        let t = trie(&[("example.com", 1)]);
        assert_eq!(t.search("example.com"), Some(&1));
        assert_eq!(t.search("EXAMPLE.com."), Some(&1));
        assert_eq!(t.search("www.example.com"), None);
    }

    #[test]
    fn test_star_matches_one_label() {
        let t = trie(&[("*.example.com", 1)]);
        assert_eq!(t.search("a.example.com"), Some(&1));
        assert_eq!(t.search("example.com"), None);
        assert_eq!(t.search("a.b.example.com"), None);
    }

    #[test]
    fn test_dot_wildcard_matches_any_depth() {
        let t = trie(&[(".example.com", 1)]);
        assert_eq!(t.search("a.b.example.com"), Some(&1));
        assert_eq!(t.search("example.com"), None);
    }

    #[test]
    fn test_plus_matches_root_and_subdomains() {
        let t = trie(&[("+.example.com", 7)]);
        assert_eq!(t.search("example.com"), Some(&7));
        assert_eq!(t.search("deep.sub.example.com"), Some(&7));
        assert_eq!(t.search("notexample.com"), None);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_exact_beats_wildcards() {
        let t = trie(&[("+.example.com", 1), ("www.example.com", 2), ("*.example.com", 3)]);
        assert_eq!(t.search("www.example.com"), Some(&2));
        assert_eq!(t.search("api.example.com"), Some(&3));
        assert_eq!(t.search("a.api.example.com"), Some(&1));
    }

    #[test]
    fn test_middle_star() {
        let t = trie(&[("www.*.com", 1)]);
        assert_eq!(t.search("www.example.com"), Some(&1));
        assert_eq!(t.search("api.example.com"), None);
    }

    #[test]
    fn test_rejects_malformed_patterns() {
        let mut t: DomainTrie<u32> = DomainTrie::new();
        assert!(!t.insert("", 1));
        assert!(!t.insert("a..com", 1));
        assert!(t.is_empty());
    }
}
