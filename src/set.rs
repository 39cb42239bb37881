//! `PermissionSet`: a radix-like tree of dotted permission paths.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::path::PermissionPath;
use crate::permission::{self, Permission};

#[derive(Default, Debug, Clone)]
struct Node {
    permission: Option<Permission>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.permission.is_none() && self.children.is_empty()
    }
}

/// A tree keyed by dotted-path node names, storing at most one
/// [`Permission`] per node, answering "most relevant permission covering
/// P" and rendering to/parsing from the save-file line format.
///
/// The tree never holds a branch with no permission and no descendant
/// permissions: [`PermissionSet::remove`] prunes dead branches as it goes.
#[derive(Default, Debug, Clone)]
pub struct PermissionSet {
    root: Node,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `permission_string` and stores it at the path it names,
    /// replacing (and returning) whatever [`Permission`] was previously at
    /// that exact node.
    pub fn set(&mut self, permission_string: &str) -> Result<Option<Permission>, Error> {
        let (path, permission) = permission::parse_permission_string(permission_string)?;
        Ok(self.insert(&path, permission))
    }

    pub(crate) fn insert(&mut self, path: &PermissionPath, permission: Permission) -> Option<Permission> {
        let mut node = &mut self.root;
        for segment in path.nodes() {
            node = node.children.entry(segment.clone()).or_default();
        }
        node.permission.replace(permission)
    }

    /// Clears whatever permission is stored at `path`, pruning any branch
    /// that becomes empty as a result. Returns whether anything changed.
    pub fn remove(&mut self, path_string: &str) -> Result<bool, Error> {
        let path = PermissionPath::parse(path_string)?;
        Ok(Self::remove_at(&mut self.root, path.nodes()))
    }

    fn remove_at(node: &mut Node, remaining: &[String]) -> bool {
        match remaining.split_first() {
            None => {
                let removed = node.permission.take().is_some();
                removed
            }
            Some((head, rest)) => {
                let Some(child) = node.children.get_mut(head) else {
                    return false;
                };
                let changed = Self::remove_at(child, rest);
                if child.is_empty() {
                    node.children.remove(head);
                }
                changed
            }
        }
    }

    /// Walks from the root along `path_string`'s nodes, remembering the
    /// deepest node at which a covering permission is stored. Returns the
    /// matched path together with the permission, or `None` if nothing on
    /// the path covers it.
    pub fn most_relevant(&self, path_string: &str) -> Result<Option<(PermissionPath, Permission)>, Error> {
        let path = PermissionPath::parse(path_string)?;
        Ok(self.most_relevant_path(&path))
    }

    pub(crate) fn most_relevant_path(&self, path: &PermissionPath) -> Option<(PermissionPath, Permission)> {
        let mut node = &self.root;
        let mut best: Option<(usize, Permission)> = None;
        let nodes = path.nodes();

        if let Some(p) = &node.permission {
            best = Some((0, p.clone()));
        }

        for (depth, segment) in nodes.iter().enumerate() {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    if let Some(p) = &node.permission {
                        best = Some((depth + 1, p.clone()));
                    }
                }
                None => break,
            }
        }

        best.map(|(depth, permission)| {
            let matched = PermissionPath::from_nodes(nodes[..depth].to_vec());
            (matched, permission)
        })
    }

    /// True iff the subtree rooted at `path_string` contains any
    /// permission, including at the root of the subtree itself.
    pub fn has_any(&self, path_string: &str) -> Result<bool, Error> {
        let path = PermissionPath::parse(path_string)?;
        Ok(self.has_any_path(&path))
    }

    pub(crate) fn has_any_path(&self, path: &PermissionPath) -> bool {
        let mut node = &self.root;
        for segment in path.nodes() {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        Self::subtree_has_permission(node)
    }

    fn subtree_has_permission(node: &Node) -> bool {
        node.permission.is_some() || node.children.values().any(Self::subtree_has_permission)
    }

    /// Lists every permission stored in the tree as `(dotted path,
    /// permission)` pairs, in a deterministic (lexical) order.
    pub fn list_permissions(&self) -> Vec<(PermissionPath, Permission)> {
        let mut out = Vec::new();
        Self::collect(&self.root, &mut Vec::new(), &mut out);
        out
    }

    fn collect(node: &Node, prefix: &mut Vec<String>, out: &mut Vec<(PermissionPath, Permission)>) {
        if let Some(p) = &node.permission {
            out.push((PermissionPath::from_nodes(prefix.clone()), p.clone()));
        }
        for (name, child) in &node.children {
            prefix.push(name.clone());
            Self::collect(child, prefix, out);
            prefix.pop();
        }
    }

    /// Renders every stored permission as save-format lines, indented by
    /// `indent` columns (continuation lines get `indent + 4`).
    pub fn to_save_lines(&self, indent: usize) -> Vec<String> {
        self.list_permissions()
            .into_iter()
            .map(|(path, permission)| render_permission_line(&path, &permission, indent))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

/// Reconstructs the bare `[-]path[.* ]` head token for a permission,
/// without indentation or its argument — the form `Registry::list_permissions`
/// hands back to callers.
pub(crate) fn render_head(path: &PermissionPath, permission: &Permission) -> String {
    let mut head = String::new();
    let exact_negated = permission.negates_exact && !permission.includes_exact;
    let descendants_only = !permission.includes_exact && !permission.negates_exact;

    if exact_negated && permission.negates_descendants {
        head.push('-');
        head.push_str(&path.to_string());
    } else if permission.negates_descendants && descendants_only {
        head.push('-');
        head.push_str(&path.to_string());
        head.push_str(".*");
    } else if permission.includes_descendants && descendants_only {
        head.push_str(&path.to_string());
        head.push_str(".*");
    } else {
        head.push_str(&path.to_string());
    }
    head
}

fn render_permission_line(path: &PermissionPath, permission: &Permission, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let head = render_head(path, permission);

    let mut line = format!("{}{}", pad, head);
    if let Some(arg) = &permission.argument {
        line.push(':');
        let mut parts = arg.split('\n');
        line.push_str(parts.next().unwrap_or(""));
        let cont_pad = " ".repeat(indent + 4);
        for rest in parts {
            line.push('\n');
            line.push_str(&cont_pad);
            line.push_str(rest);
        }
    }
    line
}
