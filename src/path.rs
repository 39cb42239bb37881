//! Dotted permission paths.

use std::fmt;

use crate::error::Error;

fn is_node_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// An ordered sequence of non-empty alphanumeric nodes, as written in
/// dotted form (`first.second.third`).
///
/// Two paths compare by lexical node-wise prefix: `a` *covers* `b` iff
/// every node of `a` equals the corresponding node of `b` and `b` has at
/// least as many nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionPath {
    nodes: Vec<String>,
}

impl PermissionPath {
    /// Parses a dotted path. Fails if any node is empty or contains a
    /// character other than a letter or digit.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::InvalidPermission(s.to_string()));
        }
        let mut nodes = Vec::new();
        for node in s.split('.') {
            if node.is_empty() || !node.chars().all(is_node_char) {
                return Err(Error::InvalidPermission(s.to_string()));
            }
            nodes.push(node.to_string());
        }
        Ok(PermissionPath { nodes })
    }

    /// Builds a path directly from already-validated nodes, skipping the
    /// grammar check `parse` performs. Used internally wherever a path is
    /// assembled from nodes we already walked a tree with.
    pub(crate) fn from_nodes(nodes: Vec<String>) -> Self {
        PermissionPath { nodes }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True iff `self` is a node-wise prefix of `other` (including being
    /// equal to it).
    pub fn covers(&self, other: &PermissionPath) -> bool {
        self.nodes.len() <= other.nodes.len() && self.nodes.iter().zip(&other.nodes).all(|(a, b)| a == b)
    }
}

impl fmt::Display for PermissionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nodes.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let p = PermissionPath::parse("first.second").unwrap();
        assert_eq!(p.nodes(), &["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn rejects_empty_node() {
        assert!(PermissionPath::parse("first..second").is_err());
        assert!(PermissionPath::parse("").is_err());
        assert!(PermissionPath::parse(".").is_err());
    }

    #[test]
    fn rejects_non_alphanumeric() {
        assert!(PermissionPath::parse("first.sec-ond").is_err());
        assert!(PermissionPath::parse("first.*").is_err());
        assert!(PermissionPath::parse("-first").is_err());
    }

    #[test]
    fn covers_is_prefix_inclusive() {
        let a = PermissionPath::parse("first.second").unwrap();
        let b = PermissionPath::parse("first.second.third").unwrap();
        assert!(a.covers(&a));
        assert!(a.covers(&b));
        assert!(!b.covers(&a));

        let c = PermissionPath::parse("first.other").unwrap();
        assert!(!a.covers(&c));
    }

    #[test]
    fn display_roundtrips_into_dotted_form() {
        let p = PermissionPath::parse("a.b.c").unwrap();
        assert_eq!(p.to_string(), "a.b.c");
    }
}
