//! Batch application of edits to a tree

use super::{Edit, EditOp, FixBatch, FixOutcome, FixStatus, InsertPosition};
use crate::syntax::{NodeId, Span, SyntaxNode, SyntaxTree, TreeError};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

enum Resolved {
    Replace(NodeId, Arc<SyntaxNode>),
    Remove(NodeId),
    Insert(NodeId, Arc<SyntaxNode>, InsertPosition),
}

/// Edits accepted so far, keyed by node of the input tree
#[derive(Default)]
struct Plan {
    /// Replaced or removed nodes; `None` removes
    regions: BTreeMap<NodeId, Option<Arc<SyntaxNode>>>,
    inserts: BTreeMap<NodeId, Vec<(InsertPosition, Arc<SyntaxNode>)>>,
}

impl Plan {
    fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.inserts.is_empty()
    }

    fn conflict(&self, tree: &SyntaxTree, ops: &[Resolved]) -> Option<String> {
        for op in ops {
            match op {
                Resolved::Remove(target) if *target == NodeId::ROOT => {
                    return Some("cannot remove the root node".to_string());
                }
                Resolved::Replace(target, _) | Resolved::Remove(target) => {
                    for &claimed in self.regions.keys() {
                        if tree.is_ancestor_or_self(claimed, *target)
                            || tree.is_ancestor_or_self(*target, claimed)
                        {
                            return Some(format!(
                                "overlaps an earlier fix at {}",
                                node_span(tree, claimed)
                            ));
                        }
                    }
                    for &parent in self.inserts.keys() {
                        if tree.is_ancestor_or_self(*target, parent) {
                            return Some(format!(
                                "would discard content inserted by an earlier fix at {}",
                                node_span(tree, parent)
                            ));
                        }
                    }
                }
                Resolved::Insert(parent, child, _) => {
                    for &claimed in self.regions.keys() {
                        if tree.is_ancestor_or_self(claimed, *parent) {
                            return Some(format!(
                                "insertion point lies inside an earlier fix at {}",
                                node_span(tree, claimed)
                            ));
                        }
                    }
                    let Some(name) = child.name() else { continue };
                    let clash = self.inserts.get(parent).into_iter().flatten().any(|(_, other)| {
                        other.kind == child.kind && other.name() == Some(name) && !same_shape(other, child)
                    });
                    if clash {
                        return Some(format!(
                            "declares '{}' differently from an earlier fix",
                            name
                        ));
                    }
                }
            }
        }
        None
    }

    fn accept(&mut self, ops: Vec<Resolved>) {
        for op in ops {
            match op {
                Resolved::Replace(target, replacement) => {
                    self.regions.insert(target, Some(replacement));
                }
                Resolved::Remove(target) => {
                    self.regions.insert(target, None);
                }
                Resolved::Insert(parent, child, position) => {
                    let pending = self.inserts.entry(parent).or_default();
                    if !pending.iter().any(|(_, c)| same_shape(c, &child)) {
                        pending.push((position, child));
                    }
                }
            }
        }
    }
}

fn node_span(tree: &SyntaxTree, id: NodeId) -> Span {
    tree.node(id).map(|n| n.span).unwrap_or_default()
}

fn resolve(tree: &SyntaxTree, edit: &Edit) -> Result<Vec<Resolved>, String> {
    let missing = |kind: &dyn std::fmt::Display, span: Span| {
        format!("{} at {} is no longer in the tree", kind, span)
    };
    edit.ops
        .iter()
        .map(|op| match op {
            EditOp::Replace {
                target,
                replacement,
            } => tree
                .resolve(target)
                .map(|id| Resolved::Replace(id, Arc::clone(replacement)))
                .ok_or_else(|| missing(&target.kind, target.span)),
            EditOp::Remove { target } => tree
                .resolve(target)
                .map(Resolved::Remove)
                .ok_or_else(|| missing(&target.kind, target.span)),
            EditOp::Insert {
                parent,
                child,
                position,
            } => tree
                .resolve(parent)
                .map(|id| Resolved::Insert(id, Arc::clone(child), position.clone()))
                .ok_or_else(|| missing(&parent.kind, parent.span)),
        })
        .collect()
}

/// Apply `edits` to `tree` as one batch
///
/// Edits are considered in location order; each is either accepted whole
/// or rejected whole. Accepted edits are applied in a single rewrite of
/// the input tree.
pub(super) fn apply_edits(tree: &SyntaxTree, edits: &[Edit]) -> FixBatch {
    let mut outcomes: Vec<FixOutcome> = edits.iter().map(FixOutcome::computed).collect();
    let mut order: Vec<usize> = (0..edits.len()).collect();
    order.sort_by(|&a, &b| {
        let (ea, eb) = (&edits[a], &edits[b]);
        // outer node first when two anchors start together
        ea.anchor
            .start
            .cmp(&eb.anchor.start)
            .then(eb.anchor.end.cmp(&ea.anchor.end))
            .then_with(|| ea.rule_id.cmp(&eb.rule_id))
            .then(a.cmp(&b))
    });

    let mut plan = Plan::default();
    for idx in order {
        let edit = &edits[idx];
        outcomes[idx].status = match resolve(tree, edit) {
            Err(reason) => {
                log::warn!(
                    "{}: dropping fix '{}' for {}: {}",
                    tree.path().display(),
                    edit.title,
                    edit.rule_id,
                    reason
                );
                FixStatus::Dropped { reason }
            }
            Ok(ops) => match plan.conflict(tree, &ops) {
                Some(reason) => {
                    log::warn!(
                        "{}: rejecting fix '{}' for {} at {}: {}",
                        tree.path().display(),
                        edit.title,
                        edit.rule_id,
                        edit.anchor,
                        reason
                    );
                    FixStatus::Rejected { reason }
                }
                None => {
                    plan.accept(ops);
                    FixStatus::Applied
                }
            },
        };
    }

    if plan.is_empty() {
        return FixBatch {
            tree: tree.clone(),
            outcomes,
        };
    }

    match rewrite(tree, &plan) {
        Ok(fixed) => FixBatch {
            tree: fixed,
            outcomes,
        },
        Err(err) => {
            log::warn!("{}: fixed tree is invalid: {}", tree.path().display(), err);
            for outcome in &mut outcomes {
                if outcome.status == FixStatus::Applied {
                    outcome.status = FixStatus::Rejected {
                        reason: format!("fixed tree is invalid: {}", err),
                    };
                }
            }
            FixBatch {
                tree: tree.clone(),
                outcomes,
            }
        }
    }
}

/// Rebuild the nodes on the paths from the root to every edited node
///
/// Everything off those paths is shared with the input tree.
fn rewrite(tree: &SyntaxTree, plan: &Plan) -> Result<SyntaxTree, TreeError> {
    let mut dirty: HashSet<NodeId> = HashSet::new();
    for &start in plan.regions.keys().chain(plan.inserts.keys()) {
        let mut current = Some(start);
        while let Some(id) = current {
            if !dirty.insert(id) {
                break;
            }
            current = tree.parent_of(id);
        }
    }

    let mut order: Vec<NodeId> = dirty.into_iter().collect();
    order.sort_by_key(|&id| (Reverse(tree.depth(id)), id));

    // inserted nodes get fresh offsets past the end of the source
    let mut next_offset = tree.extent() + 1;
    let mut rebuilt: HashMap<NodeId, Option<Arc<SyntaxNode>>> = HashMap::new();
    for id in order {
        let Some(node) = tree.node(id) else { continue };

        if let Some(replacement) = plan.regions.get(&id) {
            let value = replacement
                .as_ref()
                .map(|r| SyntaxNode::anchored(r, node.span));
            rebuilt.insert(id, value);
            continue;
        }

        let mut children: Vec<Arc<SyntaxNode>> = Vec::with_capacity(node.children.len());
        for &child in tree.children_of(id) {
            match rebuilt.remove(&child) {
                Some(Some(updated)) => children.push(updated),
                Some(None) => {}
                None => {
                    if let Some(original) = tree.node(child) {
                        children.push(Arc::clone(original));
                    }
                }
            }
        }

        if let Some(pending) = plan.inserts.get(&id) {
            let (line, column) = (node.span.line, node.span.column);
            for (position, child) in pending {
                let child = SyntaxNode::laid_out(child, line, column, &mut next_offset);
                place(&mut children, position, child);
            }
        }

        rebuilt.insert(
            id,
            Some(Arc::new(SyntaxNode {
                kind: node.kind.clone(),
                span: node.span,
                text: node.text.clone(),
                children,
            })),
        );
    }

    let root = rebuilt
        .remove(&NodeId::ROOT)
        .flatten()
        .ok_or(TreeError::MissingRoot(None))?;
    SyntaxTree::new(tree.path(), root)
}

/// Insert `child` among `children`; a structurally identical child already
/// present makes this a no-op
fn place(children: &mut Vec<Arc<SyntaxNode>>, position: &InsertPosition, child: Arc<SyntaxNode>) {
    if children.iter().any(|c| same_shape(c, &child)) {
        return;
    }
    let index = match position {
        InsertPosition::First => 0,
        InsertPosition::Last => children.len(),
        InsertPosition::Before(kind) => children
            .iter()
            .position(|c| &c.kind == kind)
            .unwrap_or(children.len()),
        InsertPosition::SortedByName => {
            let name = child.name();
            let same_kind: Vec<usize> = children
                .iter()
                .enumerate()
                .filter(|(_, c)| c.kind == child.kind)
                .map(|(i, _)| i)
                .collect();
            match same_kind.last() {
                Some(&last) => same_kind
                    .iter()
                    .copied()
                    .find(|&i| children[i].name() > name)
                    .unwrap_or(last + 1),
                None => children
                    .iter()
                    .position(|c| c.kind.starts_line())
                    .unwrap_or(children.len()),
            }
        }
    };
    children.insert(index, child);
}

/// Structural equality ignoring spans
fn same_shape(a: &SyntaxNode, b: &SyntaxNode) -> bool {
    let mut stack = vec![(a, b)];
    while let Some((x, y)) = stack.pop() {
        if x.kind != y.kind || x.text != y.text || x.children.len() != y.children.len() {
            return false;
        }
        stack.extend(x.children.iter().map(|c| &**c).zip(y.children.iter().map(|c| &**c)));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::FixSafety;
    use crate::fix::EditOp;
    use crate::syntax::{NodeBuilder, NodeKind};
    use pretty_assertions::assert_eq;

    fn tree() -> SyntaxTree {
        let root = NodeBuilder::new(NodeKind::ClassDecl)
            .child(NodeBuilder::ident("Foo"))
            .child(
                NodeBuilder::new(NodeKind::MethodDecl)
                    .child(NodeBuilder::ident("Run"))
                    .child(
                        NodeBuilder::new(NodeKind::Block)
                            .child(NodeBuilder::string("a"))
                            .child(NodeBuilder::string("b")),
                    ),
            )
            .build();
        SyntaxTree::new("Foo.cs", root).unwrap()
    }

    fn edit(tree: &SyntaxTree, rule: &str, anchor: NodeId, ops: Vec<EditOp>) -> Edit {
        Edit {
            tree: tree.id(),
            file: tree.path().to_path_buf(),
            rule_id: rule.to_string(),
            title: format!("fix {}", rule),
            equivalence_key: rule.to_string(),
            safety: FixSafety::Safe,
            anchor: tree.node(anchor).unwrap().span,
            ops,
        }
    }

    fn find(tree: &SyntaxTree, kind: NodeKind, n: usize) -> NodeId {
        tree.nodes_of_kind(&kind).nth(n).unwrap().id()
    }

    fn replace_with(tree: &SyntaxTree, id: NodeId, text: &str) -> EditOp {
        let cursor = tree.cursor(id).unwrap();
        EditOp::replace(
            &cursor,
            SyntaxNode::detached(cursor.kind().clone())
                .with_text(text)
                .into_arc(),
        )
    }

    #[test]
    fn test_replace_shares_untouched_subtrees() {
        let tree = tree();
        let a = find(&tree, NodeKind::StringLiteral, 0);
        let batch = apply_edits(&tree, &[edit(&tree, "R1", a, vec![replace_with(&tree, a, "x")])]);

        assert_eq!(batch.applied(), 1);
        let fixed = &batch.tree;
        let texts: Vec<_> = fixed
            .nodes_of_kind(&NodeKind::StringLiteral)
            .map(|c| c.text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["x", "b"]);

        // the class name identifier was not on the edited path
        let before = tree.root().children[0].clone();
        let after = fixed.root().children[0].clone();
        assert!(Arc::ptr_eq(&before, &after));
        // the input tree is unchanged
        assert_eq!(tree.cursor(a).unwrap().text(), Some("a"));
    }

    #[test]
    fn test_overlapping_edit_is_rejected() {
        let tree = tree();
        let block = find(&tree, NodeKind::Block, 0);
        let a = find(&tree, NodeKind::StringLiteral, 0);
        let remove_block = EditOp::remove(&tree.cursor(block).unwrap());
        // the block and its first literal start at the same offset; the
        // enclosing block is taken first whatever the input order
        assert_eq!(tree.node(block).unwrap().span.start, tree.node(a).unwrap().span.start);
        let edits = vec![
            edit(&tree, "R2", a, vec![replace_with(&tree, a, "x")]),
            edit(&tree, "R1", block, vec![remove_block]),
        ];
        let batch = apply_edits(&tree, &edits);

        assert_eq!(batch.outcomes[1].status, FixStatus::Applied);
        assert!(matches!(batch.outcomes[0].status, FixStatus::Rejected { .. }));
        assert!(batch.tree.nodes_of_kind(&NodeKind::Block).next().is_none());
    }

    #[test]
    fn test_root_removal_is_rejected() {
        let tree = tree();
        let op = EditOp::remove(&tree.root_cursor());
        let batch = apply_edits(&tree, &[edit(&tree, "R1", NodeId::ROOT, vec![op])]);
        assert_eq!(batch.rejected(), 1);
        assert_eq!(batch.tree.root(), tree.root());
    }

    #[test]
    fn test_unresolvable_edit_is_dropped() {
        let tree = tree();
        let other = self::tree();
        let a = find(&other, NodeKind::StringLiteral, 0);
        let cursor = other.cursor(a).unwrap();
        let mut op = EditOp::replace(&cursor, SyntaxNode::detached(NodeKind::StringLiteral).with_text("x").into_arc());
        if let EditOp::Replace { target, .. } = &mut op {
            target.span = Span::new(900, 901, 9, 9);
        }
        let batch = apply_edits(&tree, &[edit(&other, "R1", a, vec![op])]);
        assert_eq!(batch.dropped(), 1);
        assert!(!batch.is_changed());
    }

    #[test]
    fn test_identical_inserts_are_applied_once() {
        let tree = tree();
        let class = tree.root_cursor();
        let field = NodeBuilder::new(NodeKind::FieldDecl)
            .child(NodeBuilder::ident("Shared"))
            .build();
        let a = find(&tree, NodeKind::StringLiteral, 0);
        let b = find(&tree, NodeKind::StringLiteral, 1);
        let edits = vec![
            edit(
                &tree,
                "R1",
                a,
                vec![
                    replace_with(&tree, a, "x"),
                    EditOp::insert(&class, field.clone(), InsertPosition::SortedByName),
                ],
            ),
            edit(
                &tree,
                "R1",
                b,
                vec![
                    replace_with(&tree, b, "y"),
                    EditOp::insert(&class, field, InsertPosition::SortedByName),
                ],
            ),
        ];
        let batch = apply_edits(&tree, &edits);

        assert_eq!(batch.applied(), 2);
        let fields = batch.tree.nodes_of_kind(&NodeKind::FieldDecl).count();
        assert_eq!(fields, 1);
        // sorted insert lands before the first member declaration
        let kinds: Vec<_> = batch.tree.root().children.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(kinds, vec![NodeKind::Identifier, NodeKind::FieldDecl, NodeKind::MethodDecl]);
    }

    #[test]
    fn test_inserted_nodes_get_distinct_spans() {
        let tree = tree();
        let class = tree.root_cursor();
        let constant = |name: &str, value: &str| {
            SyntaxNode::detached(NodeKind::FieldDecl)
                .with_child(SyntaxNode::detached(NodeKind::Identifier).with_text(name).into_arc())
                .with_child(SyntaxNode::detached(NodeKind::StringLiteral).with_text(value).into_arc())
                .into_arc()
        };
        let a = find(&tree, NodeKind::StringLiteral, 0);
        let b = find(&tree, NodeKind::StringLiteral, 1);
        let edits = vec![
            edit(&tree, "R1", a, vec![EditOp::insert(&class, constant("A", "a"), InsertPosition::SortedByName)]),
            edit(&tree, "R1", b, vec![EditOp::insert(&class, constant("B", "b"), InsertPosition::SortedByName)]),
        ];
        let batch = apply_edits(&tree, &edits);
        assert_eq!(batch.applied(), 2);

        let fixed = &batch.tree;
        let fields: Vec<_> = fixed.nodes_of_kind(&NodeKind::FieldDecl).collect();
        assert_eq!(fields.len(), 2);
        let mut spans: Vec<Span> = fixed
            .ids()
            .filter_map(|id| fixed.node(id))
            .map(|n| n.span)
            .filter(|span| span.start > tree.extent())
            .collect();
        assert_eq!(spans.len(), 6);
        spans.sort_by_key(|s| s.start);
        spans.dedup();
        assert_eq!(spans.len(), 6, "every inserted node has its own span");

        for field in &fields {
            let span = field.span();
            assert!(span.start > tree.extent());
            assert_eq!(fixed.find(span, &NodeKind::FieldDecl), Some(field.id()));
            let name = field.first_child_of_kind(&NodeKind::Identifier).unwrap();
            assert_eq!(fixed.find(name.span(), &NodeKind::Identifier), Some(name.id()));
        }
    }

    #[test]
    fn test_clashing_declarations_are_rejected() {
        let tree = tree();
        let class = tree.root_cursor();
        let field = |value: &str| {
            NodeBuilder::new(NodeKind::FieldDecl)
                .child(NodeBuilder::ident("Value"))
                .child(NodeBuilder::string(value))
                .build()
        };
        let a = find(&tree, NodeKind::StringLiteral, 0);
        let b = find(&tree, NodeKind::StringLiteral, 1);
        let edits = vec![
            edit(&tree, "R1", a, vec![EditOp::insert(&class, field("a"), InsertPosition::Last)]),
            edit(&tree, "R1", b, vec![EditOp::insert(&class, field("b"), InsertPosition::Last)]),
        ];
        let batch = apply_edits(&tree, &edits);
        assert_eq!(batch.applied(), 1);
        assert_eq!(batch.rejected(), 1);
    }

    #[test]
    fn test_insert_positions() {
        let leaf = |kind: NodeKind, text: &str| SyntaxNode::detached(kind).with_text(text).into_arc();
        let mut children = vec![
            leaf(NodeKind::Modifier, "public"),
            leaf(NodeKind::TypeRef, "Task"),
        ];
        place(&mut children, &InsertPosition::Before(NodeKind::TypeRef), leaf(NodeKind::Modifier, "async"));
        place(&mut children, &InsertPosition::First, leaf(NodeKind::Attribute, "Obsolete"));
        place(&mut children, &InsertPosition::Last, leaf(NodeKind::Block, ""));
        // duplicate
        place(&mut children, &InsertPosition::Last, leaf(NodeKind::Block, ""));

        let texts: Vec<_> = children.iter().map(|c| c.text.clone().unwrap_or_default()).collect();
        assert_eq!(texts, vec!["Obsolete", "public", "async", "Task", ""]);
    }

    #[test]
    fn test_no_edits_returns_equal_tree() {
        let tree = tree();
        let batch = apply_edits(&tree, &[]);
        assert!(batch.outcomes.is_empty());
        assert_eq!(batch.tree.root(), tree.root());
    }
}
