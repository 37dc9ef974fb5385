//! Semantic information supplied by the host compiler
//!
//! The engine never resolves symbols itself. Hosts provide a
//! [`SymbolContext`]; [`SemanticModel`] is the serializable form used by
//! compilation-unit files, keyed by node span.

use crate::syntax::{Cursor, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Method,
    Property,
    Field,
    Local,
    Parameter,
    Type,
    Namespace,
    Event,
}

/// A resolved symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub is_static: bool,
    /// Simple name of the declaring type
    #[serde(default)]
    pub containing_type: Option<String>,
    #[serde(default)]
    pub containing_namespace: Option<String>,
    /// Type of the symbol's value (property type, method return type)
    #[serde(default)]
    pub type_name: Option<String>,
}

impl Symbol {
    pub fn new(name: &str, kind: SymbolKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            is_static: false,
            containing_type: None,
            containing_namespace: None,
            type_name: None,
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_containing_type(mut self, name: &str) -> Self {
        self.containing_type = Some(name.to_string());
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.containing_namespace = Some(namespace.to_string());
        self
    }

    pub fn with_type_name(mut self, name: &str) -> Self {
        self.type_name = Some(name.to_string());
        self
    }
}

/// Type of an expression or declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Interfaces implemented, directly or through base types
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl TypeRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            interfaces: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Whether this type is, or implements, `name` (simple or qualified)
    pub fn implements(&self, name: &str) -> bool {
        let wanted = simple_name(name);
        simple_name(&self.name) == wanted
            || self.interfaces.iter().any(|i| simple_name(i) == wanted)
    }
}

/// `System.Windows.Input.ICommand` -> `ICommand`
pub fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Read-only access to host semantic information
pub trait SymbolContext: Send + Sync {
    fn symbol(&self, node: &Cursor<'_>) -> Option<&Symbol>;

    fn type_of(&self, node: &Cursor<'_>) -> Option<&TypeRef>;
}

/// One span-keyed entry of a [`SemanticModel`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticEntry {
    pub start: usize,
    pub end: usize,
    /// Restricts the entry to one node kind when several nodes share a span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<TypeRef>,
}

/// Host-supplied semantic facts for one compilation unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SemanticEntry>", into = "Vec<SemanticEntry>")]
pub struct SemanticModel {
    entries: Vec<SemanticEntry>,
    by_span: HashMap<(usize, usize), Vec<usize>>,
}

impl SemanticModel {
    /// Model with no facts; semantic predicates never match
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, entry: SemanticEntry) {
        let idx = self.entries.len();
        self.by_span
            .entry((entry.start, entry.end))
            .or_default()
            .push(idx);
        self.entries.push(entry);
    }

    /// Attach a symbol to the node at `node`'s span
    pub fn with_symbol(mut self, node: &Cursor<'_>, symbol: Symbol) -> Self {
        let span = node.span();
        self.insert(SemanticEntry {
            start: span.start,
            end: span.end,
            kind: Some(node.kind().clone()),
            symbol: Some(symbol),
            type_ref: None,
        });
        self
    }

    /// Attach a type to the node at `node`'s span
    pub fn with_type(mut self, node: &Cursor<'_>, type_ref: TypeRef) -> Self {
        let span = node.span();
        self.insert(SemanticEntry {
            start: span.start,
            end: span.end,
            kind: Some(node.kind().clone()),
            symbol: None,
            type_ref: Some(type_ref),
        });
        self
    }

    fn lookup<'a, T>(
        &'a self,
        node: &Cursor<'_>,
        field: impl Fn(&'a SemanticEntry) -> Option<&'a T>,
    ) -> Option<&'a T> {
        let span = node.span();
        let candidates = self.by_span.get(&(span.start, span.end))?;
        let mut fallback = None;
        for &idx in candidates {
            let entry = &self.entries[idx];
            let Some(value) = field(entry) else {
                continue;
            };
            match &entry.kind {
                Some(kind) if kind == node.kind() => return Some(value),
                Some(_) => {}
                None => {
                    fallback.get_or_insert(value);
                }
            }
        }
        fallback
    }
}

impl SymbolContext for SemanticModel {
    fn symbol(&self, node: &Cursor<'_>) -> Option<&Symbol> {
        self.lookup(node, |e| e.symbol.as_ref())
    }

    fn type_of(&self, node: &Cursor<'_>) -> Option<&TypeRef> {
        self.lookup(node, |e| e.type_ref.as_ref())
    }
}

impl From<Vec<SemanticEntry>> for SemanticModel {
    fn from(entries: Vec<SemanticEntry>) -> Self {
        let mut model = SemanticModel::empty();
        for entry in entries {
            model.insert(entry);
        }
        model
    }
}

impl From<SemanticModel> for Vec<SemanticEntry> {
    fn from(model: SemanticModel) -> Self {
        model.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{NodeBuilder, SyntaxTree};

    fn tree() -> SyntaxTree {
        let root = NodeBuilder::new(NodeKind::ExpressionStatement)
            .child(
                NodeBuilder::new(NodeKind::MemberAccess)
                    .child(NodeBuilder::ident("DateTime"))
                    .child(NodeBuilder::ident("Now")),
            )
            .build();
        SyntaxTree::new("Clock.cs", root).unwrap()
    }

    #[test]
    fn test_symbol_lookup_prefers_kind_match() {
        let tree = tree();
        let statement = tree.root_cursor();
        let access = tree.nodes_of_kind(&NodeKind::MemberAccess).next().unwrap();
        assert_eq!(statement.span(), access.span());

        let model = SemanticModel::empty().with_symbol(
            &access,
            Symbol::new("Now", SymbolKind::Property)
                .with_static(true)
                .with_containing_type("DateTime"),
        );

        assert!(model.symbol(&access).is_some_and(|s| s.is_static));
        assert!(model.symbol(&statement).is_none());
    }

    #[test]
    fn test_kindless_entry_is_fallback() {
        let tree = tree();
        let access = tree.nodes_of_kind(&NodeKind::MemberAccess).next().unwrap();
        let span = access.span();
        let model = SemanticModel::from(vec![SemanticEntry {
            start: span.start,
            end: span.end,
            kind: None,
            symbol: None,
            type_ref: Some(TypeRef::new("DateTime").with_namespace("System")),
        }]);
        assert_eq!(model.type_of(&access).map(|t| t.name.as_str()), Some("DateTime"));
        assert!(model.symbol(&access).is_none());
    }

    #[test]
    fn test_type_implements() {
        let relay = TypeRef::new("RelayCommand").with_interface("System.Windows.Input.ICommand");
        assert!(relay.implements("ICommand"));
        assert!(relay.implements("RelayCommand"));
        assert!(!relay.implements("IDisposable"));
    }

    #[test]
    fn test_model_from_json() {
        let json = r#"[
            { "start": 0, "end": 12, "kind": "member_access",
              "symbol": { "name": "Now", "kind": "property", "is_static": true, "containing_type": "DateTime" } }
        ]"#;
        let model: SemanticModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.len(), 1);
    }
}
