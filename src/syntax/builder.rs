//! Fluent tree construction with automatic layout
//!
//! Spans are assigned in source order as if the tree were printed with a
//! single space between siblings and a line break before every
//! declaration or statement. Hosts that own real positions build
//! [`SyntaxNode`]s directly or go through [`super::host::HostTree`].

use super::{NodeKind, Span, SyntaxNode};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NodeBuilder {
    kind: NodeKind,
    text: Option<String>,
    children: Vec<NodeBuilder>,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    offset: usize,
    line: usize,
    column: usize,
}

impl Position {
    fn advance(&mut self, text: &str) {
        self.offset += text.len();
        self.column += text.chars().count();
    }

    fn space(&mut self) {
        self.offset += 1;
        self.column += 1;
    }

    fn newline(&mut self) {
        self.offset += 1;
        self.line += 1;
        self.column = 1;
    }
}

impl NodeBuilder {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            text: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(kind: NodeKind, text: &str) -> Self {
        Self::new(kind).text(text)
    }

    pub fn ident(name: &str) -> Self {
        Self::leaf(NodeKind::Identifier, name)
    }

    pub fn modifier(modifier: &str) -> Self {
        Self::leaf(NodeKind::Modifier, modifier)
    }

    pub fn type_ref(name: &str) -> Self {
        Self::leaf(NodeKind::TypeRef, name)
    }

    pub fn string(value: &str) -> Self {
        Self::leaf(NodeKind::StringLiteral, value)
    }

    pub fn number(value: &str) -> Self {
        Self::leaf(NodeKind::NumericLiteral, value)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn child(mut self, child: NodeBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeBuilder>) -> Self {
        self.children.extend(children);
        self
    }

    /// Lay out and freeze the tree
    pub fn build(self) -> Arc<SyntaxNode> {
        let mut pos = Position {
            offset: 0,
            line: 1,
            column: 1,
        };
        self.layout(&mut pos)
    }

    fn layout(self, pos: &mut Position) -> Arc<SyntaxNode> {
        if self.kind.starts_line() && pos.offset > 0 {
            pos.newline();
        }
        let start = *pos;
        let mut wrote = false;

        if let Some(text) = &self.text {
            pos.advance(text);
            wrote = true;
        }

        let mut children = Vec::with_capacity(self.children.len());
        for child in self.children {
            if wrote && !child.kind.starts_line() {
                pos.space();
            }
            children.push(child.layout(pos));
            wrote = true;
        }

        Arc::new(SyntaxNode {
            kind: self.kind,
            span: Span::new(start.offset, pos.offset, start.line, start.column),
            text: self.text,
            children,
        })
    }
}
