//! Flat, id-linked tree format exchanged with host compilers
//!
//! ```json
//! { "root": 0,
//!   "nodes": [
//!     { "id": 0, "kind": "class_decl", "span": { "start": 0, "end": 9 }, "children": [1] },
//!     { "id": 1, "kind": "identifier", "span": { "start": 6, "end": 9 }, "text": "Foo" }
//!   ] }
//! ```

use super::{NodeId, NodeKind, Span, SyntaxNode, SyntaxTree, TreeError, MAX_TREE_DEPTH};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatNode {
    pub id: usize,
    pub kind: NodeKind,
    #[serde(default)]
    pub span: Span,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTree {
    pub root: Option<usize>,
    #[serde(default)]
    pub nodes: Vec<FlatNode>,
}

impl HostTree {
    /// Validate the flat graph and build a [`SyntaxTree`]
    pub fn build(&self, path: impl Into<PathBuf>) -> Result<SyntaxTree, TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::EmptyTree);
        }

        let mut index: HashMap<usize, &FlatNode> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if index.insert(node.id, node).is_some() {
                return Err(TreeError::DuplicateId(node.id));
            }
        }

        let root_id = self.root.ok_or(TreeError::MissingRoot(None))?;
        if !index.contains_key(&root_id) {
            return Err(TreeError::MissingRoot(Some(root_id)));
        }

        // Post-order conversion; `open` holds nodes whose subtree is in progress
        let mut built: HashMap<usize, Arc<SyntaxNode>> = HashMap::new();
        let mut scheduled: HashSet<usize> = HashSet::from([root_id]);
        let mut open: HashSet<usize> = HashSet::new();
        let mut stack: Vec<(usize, usize, bool)> = vec![(root_id, 0, false)];

        while let Some((id, depth, expanded)) = stack.pop() {
            let flat = index[&id];

            if expanded {
                let children = flat
                    .children
                    .iter()
                    .filter_map(|c| built.remove(c))
                    .collect();
                built.insert(
                    id,
                    Arc::new(SyntaxNode {
                        kind: flat.kind.clone(),
                        span: flat.span,
                        text: flat.text.clone(),
                        children,
                    }),
                );
                open.remove(&id);
                continue;
            }

            if depth > MAX_TREE_DEPTH {
                return Err(TreeError::DepthExceeded {
                    limit: MAX_TREE_DEPTH,
                });
            }

            open.insert(id);
            stack.push((id, depth, true));
            for &child in flat.children.iter().rev() {
                if !index.contains_key(&child) {
                    return Err(TreeError::DanglingChild { parent: id, child });
                }
                if open.contains(&child) {
                    return Err(TreeError::Cycle { node: child });
                }
                if !scheduled.insert(child) {
                    return Err(TreeError::SharedChild { node: child });
                }
                stack.push((child, depth + 1, false));
            }
        }

        let unreachable = self.nodes.len() - scheduled.len();
        if unreachable > 0 {
            log::debug!("{} host node(s) unreachable from the root", unreachable);
        }

        let root = built
            .remove(&root_id)
            .ok_or(TreeError::MissingRoot(Some(root_id)))?;
        SyntaxTree::new(path, root)
    }

    /// Dump a tree back to the flat format, ids in pre-order
    pub fn from_tree(tree: &SyntaxTree) -> Self {
        let nodes = tree
            .ids()
            .filter_map(|id| {
                let node = tree.node(id)?;
                Some(FlatNode {
                    id: id.index(),
                    kind: node.kind.clone(),
                    span: node.span,
                    text: node.text.clone(),
                    children: tree.children_of(id).iter().map(|c| c.index()).collect(),
                })
            })
            .collect();
        Self {
            root: Some(NodeId::ROOT.index()),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(id: usize, kind: &str, children: &[usize]) -> FlatNode {
        FlatNode {
            id,
            kind: NodeKind::from(kind),
            span: Span::new(id, id + 1, 1, id + 1),
            text: None,
            children: children.to_vec(),
        }
    }

    #[test]
    fn test_build_valid_tree() {
        let host = HostTree {
            root: Some(10),
            nodes: vec![
                flat(10, "class_decl", &[11, 12]),
                flat(11, "identifier", &[]),
                flat(12, "field_decl", &[]),
            ],
        };
        let tree = host.build("Foo.cs").unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().kind, NodeKind::ClassDecl);
        assert_eq!(tree.root().children[1].kind, NodeKind::FieldDecl);
    }

    #[test]
    fn test_missing_root() {
        let host = HostTree {
            root: None,
            nodes: vec![flat(0, "block", &[])],
        };
        assert_eq!(host.build("a.cs").unwrap_err(), TreeError::MissingRoot(None));

        let host = HostTree {
            root: Some(7),
            nodes: vec![flat(0, "block", &[])],
        };
        assert_eq!(
            host.build("a.cs").unwrap_err(),
            TreeError::MissingRoot(Some(7))
        );
    }

    #[test]
    fn test_empty_tree() {
        assert_eq!(
            HostTree::default().build("a.cs").unwrap_err(),
            TreeError::EmptyTree
        );
    }

    #[test]
    fn test_dangling_child() {
        let host = HostTree {
            root: Some(0),
            nodes: vec![flat(0, "block", &[5])],
        };
        assert_eq!(
            host.build("a.cs").unwrap_err(),
            TreeError::DanglingChild {
                parent: 0,
                child: 5
            }
        );
    }

    #[test]
    fn test_cycle() {
        let host = HostTree {
            root: Some(0),
            nodes: vec![flat(0, "block", &[1]), flat(1, "block", &[0])],
        };
        assert_eq!(
            host.build("a.cs").unwrap_err(),
            TreeError::Cycle { node: 0 }
        );
    }

    #[test]
    fn test_shared_child() {
        let host = HostTree {
            root: Some(0),
            nodes: vec![
                flat(0, "block", &[1, 2]),
                flat(1, "block", &[3]),
                flat(2, "block", &[3]),
                flat(3, "identifier", &[]),
            ],
        };
        assert_eq!(
            host.build("a.cs").unwrap_err(),
            TreeError::SharedChild { node: 3 }
        );
    }

    #[test]
    fn test_duplicate_id() {
        let host = HostTree {
            root: Some(0),
            nodes: vec![flat(0, "block", &[]), flat(0, "identifier", &[])],
        };
        assert_eq!(host.build("a.cs").unwrap_err(), TreeError::DuplicateId(0));
    }

    #[test]
    fn test_from_tree_round_trips() {
        let host = HostTree {
            root: Some(0),
            nodes: vec![flat(0, "class_decl", &[1]), flat(1, "identifier", &[])],
        };
        let tree = host.build("a.cs").unwrap();
        let dumped = HostTree::from_tree(&tree);
        assert_eq!(dumped, host);
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "root": 0,
            "nodes": [
                { "id": 0, "kind": "class_decl", "span": { "start": 0, "end": 9, "line": 1, "column": 1 }, "children": [1] },
                { "id": 1, "kind": "identifier", "span": { "start": 6, "end": 9 }, "text": "Foo" }
            ]
        }"#;
        let host: HostTree = serde_json::from_str(json).unwrap();
        let tree = host.build("Foo.cs").unwrap();
        assert_eq!(tree.root_cursor().name(), Some("Foo"));
    }
}
