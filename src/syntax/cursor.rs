//! Read-only traversal handle over a tree node

use super::{NodeId, NodeKind, NodeRef, Span, SyntaxNode, SyntaxTree, MAX_TREE_DEPTH};
use std::fmt;
use std::sync::Arc;

/// Cursor positioned on one node of a [`SyntaxTree`]
#[derive(Clone, Copy)]
pub struct Cursor<'t> {
    tree: &'t SyntaxTree,
    id: NodeId,
}

impl<'t> Cursor<'t> {
    pub(super) fn new(tree: &'t SyntaxTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> &'t Arc<SyntaxNode> {
        // Cursors are only created for ids inside the arena
        &self.tree.slots[self.id.index()].node
    }

    pub fn kind(&self) -> &'t NodeKind {
        &self.node().kind
    }

    pub fn is(&self, kind: &NodeKind) -> bool {
        self.kind() == kind
    }

    pub fn span(&self) -> Span {
        self.node().span
    }

    pub fn text(&self) -> Option<&'t str> {
        self.node().text.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.tree.depth(self.id)
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            tree: self.tree.id(),
            id: self.id,
            kind: self.kind().clone(),
            span: self.span(),
        }
    }

    pub fn parent(&self) -> Option<Cursor<'t>> {
        self.tree
            .parent_of(self.id)
            .map(|id| Cursor::new(self.tree, id))
    }

    pub fn children(&self) -> impl Iterator<Item = Cursor<'t>> + 't {
        let tree = self.tree;
        tree.children_of(self.id)
            .iter()
            .map(move |&id| Cursor::new(tree, id))
    }

    pub fn children_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = Cursor<'t>> + 't {
        self.children().filter(move |c| c.kind() == &kind)
    }

    pub fn first_child_of_kind(&self, kind: &NodeKind) -> Option<Cursor<'t>> {
        self.children().find(|c| c.kind() == kind)
    }

    pub fn child(&self, index: usize) -> Option<Cursor<'t>> {
        self.tree
            .children_of(self.id)
            .get(index)
            .map(|&id| Cursor::new(self.tree, id))
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self) -> Ancestors<'t> {
        Ancestors {
            tree: self.tree,
            next: self.tree.parent_of(self.id),
            remaining: MAX_TREE_DEPTH,
        }
    }

    pub fn ancestors_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = Cursor<'t>> + Clone + 't {
        self.ancestors().filter(move |c| c.kind() == &kind)
    }

    /// Nearest ancestor whose kind is one of `kinds`
    pub fn nearest_ancestor(&self, kinds: &[NodeKind]) -> Option<Cursor<'t>> {
        self.ancestors().find(|c| kinds.contains(c.kind()))
    }

    /// Descendants in pre-order, excluding this node
    pub fn descendants(&self) -> Descendants<'t> {
        let mut stack: Vec<NodeId> = self.tree.children_of(self.id).to_vec();
        stack.reverse();
        Descendants {
            tree: self.tree,
            stack,
        }
    }

    pub fn descendants_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = Cursor<'t>> + 't {
        self.descendants().filter(move |c| c.kind() == &kind)
    }

    /// Declared or referenced name of this node
    pub fn name(&self) -> Option<&'t str> {
        self.node().name()
    }

    /// Member name for member accesses and invocations
    ///
    /// `a.b.Result` yields `Result`; `task.Wait()` yields `Wait`; a plain
    /// call `Run()` yields `Run`.
    pub fn member_name(&self) -> Option<&'t str> {
        match self.kind() {
            NodeKind::MemberAccess => self
                .children()
                .filter(|c| c.is(&NodeKind::Identifier))
                .last()
                .and_then(|c| c.text()),
            NodeKind::Invocation => self.callee().and_then(|c| match c.kind() {
                NodeKind::Identifier => c.text(),
                NodeKind::MemberAccess => c.member_name(),
                _ => None,
            }),
            NodeKind::Identifier => self.text(),
            _ => None,
        }
    }

    /// Callee expression of an invocation
    pub fn callee(&self) -> Option<Cursor<'t>> {
        if !self.is(&NodeKind::Invocation) {
            return None;
        }
        self.child(0).filter(|c| !c.is(&NodeKind::ArgumentList))
    }

    /// Receiver expression of a member access (`task` in `task.Result`)
    pub fn receiver(&self) -> Option<Cursor<'t>> {
        if !self.is(&NodeKind::MemberAccess) {
            return None;
        }
        let children = self.tree.children_of(self.id);
        if children.len() < 2 {
            return None;
        }
        Some(Cursor::new(self.tree, children[0]))
    }

    /// Identifier child that carries the declared name
    pub fn name_identifier(&self) -> Option<Cursor<'t>> {
        if self.is(&NodeKind::Identifier) {
            return Some(*self);
        }
        if self.is(&NodeKind::MemberAccess) {
            return self
                .children()
                .filter(|c| c.is(&NodeKind::Identifier))
                .last();
        }
        self.first_child_of_kind(&NodeKind::Identifier).or_else(|| {
            self.first_child_of_kind(&NodeKind::VariableDeclarator)
                .and_then(|d| d.first_child_of_kind(&NodeKind::Identifier))
        })
    }

    /// Declared type text (`TypeRef` child) of a declaration
    pub fn declared_type(&self) -> Option<&'t str> {
        self.first_child_of_kind(&NodeKind::TypeRef)
            .and_then(|t| t.text())
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.node().has_modifier(modifier)
    }

    /// Attribute names attached to this declaration
    pub fn attribute_names(&self) -> impl Iterator<Item = &'t str> + 't {
        self.children_of_kind(NodeKind::Attribute)
            .filter_map(|a| a.text().or_else(|| a.name()))
    }
}

impl PartialEq for Cursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for Cursor<'_> {}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("kind", self.kind())
            .field("span", &self.span())
            .finish()
    }
}

/// Lazy ancestor walk, bounded by [`MAX_TREE_DEPTH`]
#[derive(Clone)]
pub struct Ancestors<'t> {
    tree: &'t SyntaxTree,
    next: Option<NodeId>,
    remaining: usize,
}

impl<'t> Iterator for Ancestors<'t> {
    type Item = Cursor<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.next?;
        self.remaining -= 1;
        self.next = self.tree.parent_of(id);
        Some(Cursor::new(self.tree, id))
    }
}

/// Lazy pre-order descendant walk
#[derive(Clone)]
pub struct Descendants<'t> {
    tree: &'t SyntaxTree,
    stack: Vec<NodeId>,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = Cursor<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children_of(id).iter().rev().copied());
        Some(Cursor::new(self.tree, id))
    }
}
