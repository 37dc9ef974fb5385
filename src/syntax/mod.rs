//! Syntax tree model
//!
//! Nodes are immutable and carry no parent pointers, so a subtree can be
//! shared between an original tree and any tree rewritten from it. Parent
//! links live in a per-tree arena built once when a [`SyntaxTree`] is
//! constructed; they exist only for traversal.
//!
//! ```text
//! SyntaxNode (Arc, shared) --flatten--> SyntaxTree arena --> Cursor
//! ```

mod builder;
mod cursor;
pub mod host;

pub use builder::NodeBuilder;
pub use cursor::{Ancestors, Cursor, Descendants};
pub use host::{FlatNode, HostTree};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Maximum nesting depth accepted for a tree and walked by ancestor queries
pub const MAX_TREE_DEPTH: usize = 2048;

/// Error raised for malformed host trees
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    EmptyTree,

    #[error("root node {0:?} is missing")]
    MissingRoot(Option<usize>),

    #[error("node id {0} is declared more than once")]
    DuplicateId(usize),

    #[error("node {parent} references unknown child {child}")]
    DanglingChild { parent: usize, child: usize },

    #[error("cycle detected: node {node} is its own ancestor")]
    Cycle { node: usize },

    #[error("node {node} has more than one parent")]
    SharedChild { node: usize },

    #[error("tree is deeper than {limit} levels")]
    DepthExceeded { limit: usize },
}

/// Kind tag of a syntax node
///
/// The named variants cover the shapes the built-in predicates and fixes
/// understand. Hosts with other node shapes use [`NodeKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    CompilationUnit,
    Namespace,
    ClassDecl,
    StructDecl,
    InterfaceDecl,
    MethodDecl,
    ConstructorDecl,
    PropertyDecl,
    FieldDecl,
    Parameter,
    Block,
    LocalDecl,
    VariableDeclarator,
    ExpressionStatement,
    ReturnStatement,
    Invocation,
    MemberAccess,
    ArgumentList,
    Argument,
    Identifier,
    StringLiteral,
    NumericLiteral,
    Assignment,
    ObjectCreation,
    AwaitExpression,
    Attribute,
    Modifier,
    TypeRef,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::CompilationUnit => "compilation_unit",
            NodeKind::Namespace => "namespace",
            NodeKind::ClassDecl => "class_decl",
            NodeKind::StructDecl => "struct_decl",
            NodeKind::InterfaceDecl => "interface_decl",
            NodeKind::MethodDecl => "method_decl",
            NodeKind::ConstructorDecl => "constructor_decl",
            NodeKind::PropertyDecl => "property_decl",
            NodeKind::FieldDecl => "field_decl",
            NodeKind::Parameter => "parameter",
            NodeKind::Block => "block",
            NodeKind::LocalDecl => "local_decl",
            NodeKind::VariableDeclarator => "variable_declarator",
            NodeKind::ExpressionStatement => "expression_statement",
            NodeKind::ReturnStatement => "return_statement",
            NodeKind::Invocation => "invocation",
            NodeKind::MemberAccess => "member_access",
            NodeKind::ArgumentList => "argument_list",
            NodeKind::Argument => "argument",
            NodeKind::Identifier => "identifier",
            NodeKind::StringLiteral => "string_literal",
            NodeKind::NumericLiteral => "numeric_literal",
            NodeKind::Assignment => "assignment",
            NodeKind::ObjectCreation => "object_creation",
            NodeKind::AwaitExpression => "await_expression",
            NodeKind::Attribute => "attribute",
            NodeKind::Modifier => "modifier",
            NodeKind::TypeRef => "type_ref",
            NodeKind::Other(name) => name,
        }
    }

    /// Kinds that declare a type and therefore own a member list
    pub fn is_type_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::ClassDecl | NodeKind::StructDecl | NodeKind::InterfaceDecl
        )
    }

    /// Kinds that normally begin a new source line
    pub fn starts_line(&self) -> bool {
        matches!(
            self,
            NodeKind::Namespace
                | NodeKind::ClassDecl
                | NodeKind::StructDecl
                | NodeKind::InterfaceDecl
                | NodeKind::MethodDecl
                | NodeKind::ConstructorDecl
                | NodeKind::PropertyDecl
                | NodeKind::FieldDecl
                | NodeKind::LocalDecl
                | NodeKind::ExpressionStatement
                | NodeKind::ReturnStatement
        )
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "compilation_unit" => NodeKind::CompilationUnit,
            "namespace" => NodeKind::Namespace,
            "class_decl" => NodeKind::ClassDecl,
            "struct_decl" => NodeKind::StructDecl,
            "interface_decl" => NodeKind::InterfaceDecl,
            "method_decl" => NodeKind::MethodDecl,
            "constructor_decl" => NodeKind::ConstructorDecl,
            "property_decl" => NodeKind::PropertyDecl,
            "field_decl" => NodeKind::FieldDecl,
            "parameter" => NodeKind::Parameter,
            "block" => NodeKind::Block,
            "local_decl" => NodeKind::LocalDecl,
            "variable_declarator" => NodeKind::VariableDeclarator,
            "expression_statement" => NodeKind::ExpressionStatement,
            "return_statement" => NodeKind::ReturnStatement,
            "invocation" => NodeKind::Invocation,
            "member_access" => NodeKind::MemberAccess,
            "argument_list" => NodeKind::ArgumentList,
            "argument" => NodeKind::Argument,
            "identifier" => NodeKind::Identifier,
            "string_literal" => NodeKind::StringLiteral,
            "numeric_literal" => NodeKind::NumericLiteral,
            "assignment" => NodeKind::Assignment,
            "object_creation" => NodeKind::ObjectCreation,
            "await_expression" => NodeKind::AwaitExpression,
            "attribute" => NodeKind::Attribute,
            "modifier" => NodeKind::Modifier,
            "type_ref" => NodeKind::TypeRef,
            _ => NodeKind::Other(s),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::from(s.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source range of a node: byte offsets plus the 1-based start position
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
}

impl Span {
    /// Placeholder for nodes synthesized by a fix; replaced when anchored
    pub const DETACHED: Span = Span {
        start: usize::MAX,
        end: usize::MAX,
        line: 0,
        column: 0,
    };

    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Zero-width span at an offset
    pub fn point(offset: usize, line: usize, column: usize) -> Self {
        Self::new(offset, offset, line, column)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_detached(&self) -> bool {
        *self == Self::DETACHED
    }

    /// Whether `other` lies entirely within this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two ranges share at least one position
    ///
    /// Identical zero-width spans overlap; distinct adjacent ranges do not.
    pub fn overlaps(&self, other: &Span) -> bool {
        if self.start == other.start && self.end == other.end {
            return true;
        }
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_detached() {
            return f.write_str("<detached>");
        }
        write!(f, "{}:{} [{}..{})", self.line, self.column, self.start, self.end)
    }
}

/// An immutable syntax node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Span,
    /// Token text for leaves (identifier name, literal value, modifier)
    pub text: Option<String>,
    pub children: Vec<Arc<SyntaxNode>>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            text: None,
            children: Vec::new(),
        }
    }

    /// Leaf node carrying token text
    pub fn leaf(kind: NodeKind, span: Span, text: &str) -> Self {
        Self::new(kind, span).with_text(text)
    }

    /// Node built by a fix; its span is assigned when the fix is applied
    pub fn detached(kind: NodeKind) -> Self {
        Self::new(kind, Span::DETACHED)
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_child(mut self, child: Arc<SyntaxNode>) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Arc<SyntaxNode>>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn into_arc(self) -> Arc<SyntaxNode> {
        Arc::new(self)
    }

    /// Declared or referenced name: own text for identifiers, otherwise the
    /// first identifier child (looking through a variable declarator)
    pub fn name(&self) -> Option<&str> {
        if self.kind == NodeKind::Identifier {
            return self.text.as_deref();
        }
        if let Some(ident) = self.first_child(&NodeKind::Identifier) {
            return ident.text.as_deref();
        }
        self.first_child(&NodeKind::VariableDeclarator)
            .and_then(|d| d.first_child(&NodeKind::Identifier))
            .and_then(|i| i.text.as_deref())
    }

    pub fn first_child(&self, kind: &NodeKind) -> Option<&Arc<SyntaxNode>> {
        self.children.iter().find(|c| &c.kind == kind)
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.children
            .iter()
            .any(|c| c.kind == NodeKind::Modifier && c.text.as_deref() == Some(modifier))
    }

    /// Give every detached node in this subtree the anchor span
    ///
    /// Subtrees that contain no detached node are shared, not copied.
    pub fn anchored(node: &Arc<SyntaxNode>, anchor: Span) -> Arc<SyntaxNode> {
        if !node.has_detached() {
            return Arc::clone(node);
        }
        let children = node
            .children
            .iter()
            .map(|c| SyntaxNode::anchored(c, anchor))
            .collect();
        Arc::new(SyntaxNode {
            kind: node.kind.clone(),
            span: if node.span.is_detached() {
                anchor
            } else {
                node.span
            },
            text: node.text.clone(),
            children,
        })
    }

    /// Give every detached node in this subtree its own zero-width span
    ///
    /// Offsets are taken from `next` in pre-order, so nodes laid out from
    /// one counter never share a span.
    pub fn laid_out(node: &Arc<SyntaxNode>, line: usize, column: usize, next: &mut usize) -> Arc<SyntaxNode> {
        if !node.has_detached() {
            return Arc::clone(node);
        }
        let span = if node.span.is_detached() {
            let span = Span::point(*next, line, column);
            *next += 1;
            span
        } else {
            node.span
        };
        let children = node
            .children
            .iter()
            .map(|c| SyntaxNode::laid_out(c, line, column, next))
            .collect();
        Arc::new(SyntaxNode {
            kind: node.kind.clone(),
            span,
            text: node.text.clone(),
            children,
        })
    }

    fn has_detached(&self) -> bool {
        self.span.is_detached() || self.children.iter().any(|c| c.has_detached())
    }

    /// S-expression dump, one node per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(&SyntaxNode, usize)> = vec![(self, 0)];
        while let Some((node, indent)) = stack.pop() {
            out.push_str(&"  ".repeat(indent));
            out.push('(');
            out.push_str(node.kind.as_str());
            if let Some(text) = &node.text {
                out.push_str(&format!(" {:?}", text));
            }
            out.push_str(")\n");
            for child in node.children.iter().rev() {
                stack.push((child, indent + 1));
            }
        }
        out
    }
}

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one constructed tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        TreeId(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Index of a node inside one tree's arena (pre-order position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Non-owning reference to a node of a specific tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub tree: TreeId,
    pub id: NodeId,
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
struct Slot {
    node: Arc<SyntaxNode>,
    parent: Option<NodeId>,
    depth: usize,
    children: Vec<NodeId>,
}

/// A syntax tree for one compilation unit
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    id: TreeId,
    path: PathBuf,
    slots: Vec<Slot>,
}

impl SyntaxTree {
    /// Flatten a node graph into a traversable tree
    pub fn new(path: impl Into<PathBuf>, root: Arc<SyntaxNode>) -> Result<Self, TreeError> {
        let mut slots: Vec<Slot> = Vec::new();
        let mut stack: Vec<(Arc<SyntaxNode>, Option<NodeId>, usize)> = vec![(root, None, 0)];

        while let Some((node, parent, depth)) = stack.pop() {
            if depth > MAX_TREE_DEPTH {
                return Err(TreeError::DepthExceeded {
                    limit: MAX_TREE_DEPTH,
                });
            }
            let id = NodeId(slots.len() as u32);
            if let Some(parent) = parent {
                slots[parent.index()].children.push(id);
            }
            for child in node.children.iter().rev() {
                stack.push((Arc::clone(child), Some(id), depth + 1));
            }
            slots.push(Slot {
                node,
                parent,
                depth,
                children: Vec::new(),
            });
        }

        Ok(Self {
            id: TreeId::next(),
            path: path.into(),
            slots,
        })
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Arc<SyntaxNode> {
        &self.slots[0].node
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.slots.len()
    }

    /// All node ids in pre-order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.slots.len()).map(|i| NodeId(i as u32))
    }

    pub fn root_cursor(&self) -> Cursor<'_> {
        Cursor::new(self, NodeId::ROOT)
    }

    pub fn cursor(&self, id: NodeId) -> Option<Cursor<'_>> {
        self.contains(id).then(|| Cursor::new(self, id))
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<SyntaxNode>> {
        self.slots.get(id.index()).map(|s| &s.node)
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.index()).and_then(|s| s.parent)
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.index())
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.slots.get(id.index()).map(|s| s.depth).unwrap_or(0)
    }

    pub fn node_ref(&self, id: NodeId) -> Option<NodeRef> {
        self.node(id).map(|node| NodeRef {
            tree: self.id,
            id,
            kind: node.kind.clone(),
            span: node.span,
        })
    }

    /// One past the largest source offset in the tree
    pub fn extent(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.node.span)
            .filter(|span| !span.is_detached())
            .map(|span| span.end)
            .max()
            .unwrap_or(0)
    }

    /// Locate a node by span and kind (outermost match in pre-order)
    pub fn find(&self, span: Span, kind: &NodeKind) -> Option<NodeId> {
        self.ids().find(|&id| {
            let node = &self.slots[id.index()].node;
            node.span == span && &node.kind == kind
        })
    }

    /// Resolve a reference that may come from another tree
    ///
    /// References into this tree are validated by id; references into an
    /// earlier tree are re-resolved by span and kind.
    pub fn resolve(&self, node: &NodeRef) -> Option<NodeId> {
        if node.tree == self.id {
            let slot = self.slots.get(node.id.index())?;
            return (slot.node.kind == node.kind && slot.node.span == node.span).then_some(node.id);
        }
        self.find(node.span, &node.kind)
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            steps += 1;
            if steps > MAX_TREE_DEPTH {
                return false;
            }
            current = self.parent_of(node);
        }
        false
    }

    /// Nodes whose kind is `kind`, in pre-order
    pub fn nodes_of_kind<'a>(&'a self, kind: &'a NodeKind) -> impl Iterator<Item = Cursor<'a>> + 'a {
        self.ids()
            .filter(move |&id| &self.slots[id.index()].node.kind == kind)
            .map(move |id| Cursor::new(self, id))
    }
}
