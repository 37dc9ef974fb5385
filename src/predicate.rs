//! Composable node predicates
//!
//! A predicate is a pure function of a cursor and an [`EvalContext`]. The
//! declarative variants serialize as tagged maps so rule files can express
//! them:
//!
//! ```yaml
//! predicate:
//!   type: all
//!   of:
//!     - { type: kind_is, kind: property_decl }
//!     - { type: type_implements, interface: ICommand }
//! ```
//!
//! Exception contexts (static initializers, test constructors, console
//! entry points) are ordinary predicates; a rule reports only when its
//! trigger matches and none of its exceptions do.

use crate::options::RuleOptions;
use crate::semantic::{simple_name, SymbolContext, SymbolKind};
use crate::syntax::{Cursor, NodeKind, MAX_TREE_DEPTH};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Everything a predicate may read
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub symbols: &'a dyn SymbolContext,
    pub options: &'a RuleOptions,
    /// Rule being evaluated; scopes option lookups
    pub rule_id: &'a str,
    pub file: &'a Path,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        symbols: &'a dyn SymbolContext,
        options: &'a RuleOptions,
        rule_id: &'a str,
        file: &'a Path,
    ) -> Self {
        Self {
            symbols,
            options,
            rule_id,
            file,
        }
    }

    /// Option value for the current rule
    pub fn option(&self, name: &str) -> Option<&'a str> {
        self.options.get(self.rule_id, name)
    }

    pub fn option_list(&self, name: &str) -> Option<Vec<String>> {
        self.options.list(self.rule_id, name)
    }

    pub fn option_numbers(&self, name: &str) -> Option<&'a [f64]> {
        self.options.numbers(self.rule_id, name)
    }
}

impl fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("rule_id", &self.rule_id)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Compiled regular expression that serializes as its source
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Pattern)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.0.as_str())
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

type PredicateFn = dyn Fn(&Cursor<'_>, &EvalContext<'_>) -> bool + Send + Sync;

/// Closure-backed predicate for checks the declarative variants cannot express
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    check: Arc<PredicateFn>,
}

impl CustomPredicate {
    pub fn new(
        name: &str,
        check: impl Fn(&Cursor<'_>, &EvalContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomPredicate({})", self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Always,
    All {
        of: Vec<Predicate>,
    },
    Any {
        of: Vec<Predicate>,
    },
    Not {
        predicate: Box<Predicate>,
    },
    KindIs {
        kind: NodeKind,
    },
    KindIn {
        kinds: Vec<NodeKind>,
    },
    Parent {
        predicate: Box<Predicate>,
    },
    /// Some ancestor (parent upwards) matches
    Ancestor {
        predicate: Box<Predicate>,
    },
    Child {
        predicate: Box<Predicate>,
    },
    Descendant {
        predicate: Box<Predicate>,
    },
    HasModifier {
        modifier: String,
    },
    /// Declaration carries one of the attributes (`Attribute` suffix optional)
    HasAttribute {
        names: Vec<String>,
    },
    TextEquals {
        text: String,
    },
    TextIn {
        values: Vec<String>,
    },
    TextMatches {
        pattern: Pattern,
    },
    NameIn {
        names: Vec<String>,
    },
    NameEndsWith {
        suffixes: Vec<String>,
    },
    NameMatches {
        pattern: Pattern,
    },
    /// Member name of an access or call; `option` extends the list
    MemberNameIn {
        names: Vec<String>,
        #[serde(default)]
        option: Option<String>,
    },
    SymbolIsStatic,
    SymbolKindIs {
        kind: SymbolKind,
    },
    /// Containing namespace equals or lies under a prefix; `option` replaces the list
    SymbolNamespaceHasPrefix {
        prefixes: Vec<String>,
        #[serde(default)]
        option: Option<String>,
    },
    SymbolContainingTypeIn {
        names: Vec<String>,
    },
    TypeNameIn {
        names: Vec<String>,
    },
    TypeImplements {
        interface: String,
    },
    /// Syntactic declared type (the `TypeRef` child), generic arguments ignored
    DeclaredTypeIn {
        names: Vec<String>,
    },
    /// Some member along a fluent call chain is named in `names`
    InvocationChainContains {
        names: Vec<String>,
    },
    /// Numeric literal whose value is outside the allowed set
    NumericValueNotIn {
        option: String,
        default: Vec<f64>,
    },
    #[serde(skip)]
    Custom(CustomPredicate),
}

impl Predicate {
    /// Evaluate against a node; unexpected shapes never match
    pub fn eval(&self, node: &Cursor<'_>, ctx: &EvalContext<'_>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::All { of } => of.iter().all(|p| p.eval(node, ctx)),
            Predicate::Any { of } => of.iter().any(|p| p.eval(node, ctx)),
            Predicate::Not { predicate } => !predicate.eval(node, ctx),
            Predicate::KindIs { kind } => node.kind() == kind,
            Predicate::KindIn { kinds } => kinds.contains(node.kind()),
            Predicate::Parent { predicate } => {
                node.parent().is_some_and(|p| predicate.eval(&p, ctx))
            }
            Predicate::Ancestor { predicate } => {
                node.ancestors().any(|a| predicate.eval(&a, ctx))
            }
            Predicate::Child { predicate } => node.children().any(|c| predicate.eval(&c, ctx)),
            Predicate::Descendant { predicate } => {
                node.descendants().any(|d| predicate.eval(&d, ctx))
            }
            Predicate::HasModifier { modifier } => node.has_modifier(modifier),
            Predicate::HasAttribute { names } => node.attribute_names().any(|attr| {
                let attr = simple_name(attr);
                let short = attr.strip_suffix("Attribute").unwrap_or(attr);
                names.iter().any(|n| {
                    let n = n.strip_suffix("Attribute").unwrap_or(n);
                    n == short
                })
            }),
            Predicate::TextEquals { text } => node.text() == Some(text.as_str()),
            Predicate::TextIn { values } => node
                .text()
                .is_some_and(|t| values.iter().any(|v| v == t)),
            Predicate::TextMatches { pattern } => node.text().is_some_and(|t| pattern.is_match(t)),
            Predicate::NameIn { names } => node
                .name()
                .is_some_and(|n| names.iter().any(|w| w == n)),
            Predicate::NameEndsWith { suffixes } => node
                .name()
                .is_some_and(|n| suffixes.iter().any(|s| n.ends_with(s.as_str()))),
            Predicate::NameMatches { pattern } => node.name().is_some_and(|n| pattern.is_match(n)),
            Predicate::MemberNameIn { names, option } => {
                let Some(member) = node.member_name() else {
                    return false;
                };
                names.iter().any(|n| n == member)
                    || option
                        .as_deref()
                        .and_then(|o| ctx.option_list(o))
                        .is_some_and(|extra| extra.iter().any(|n| n == member))
            }
            Predicate::SymbolIsStatic => ctx.symbols.symbol(node).is_some_and(|s| s.is_static),
            Predicate::SymbolKindIs { kind } => {
                ctx.symbols.symbol(node).is_some_and(|s| s.kind == *kind)
            }
            Predicate::SymbolNamespaceHasPrefix { prefixes, option } => {
                let Some(namespace) = ctx
                    .symbols
                    .symbol(node)
                    .and_then(|s| s.containing_namespace.as_deref())
                else {
                    return false;
                };
                let configured = option.as_deref().and_then(|o| ctx.option_list(o));
                let prefixes = configured.as_deref().unwrap_or(prefixes);
                prefixes.iter().any(|p| namespace_has_prefix(namespace, p))
            }
            Predicate::SymbolContainingTypeIn { names } => ctx
                .symbols
                .symbol(node)
                .and_then(|s| s.containing_type.as_deref())
                .is_some_and(|t| names.iter().any(|n| simple_name(n) == simple_name(t))),
            Predicate::TypeNameIn { names } => ctx
                .symbols
                .type_of(node)
                .is_some_and(|t| names.iter().any(|n| simple_name(n) == simple_name(&t.name))),
            Predicate::TypeImplements { interface } => ctx
                .symbols
                .type_of(node)
                .is_some_and(|t| t.implements(interface)),
            Predicate::DeclaredTypeIn { names } => node.declared_type().is_some_and(|t| {
                let base = t.split('<').next().unwrap_or(t).trim();
                let base = base.strip_suffix('?').unwrap_or(base);
                names.iter().any(|n| simple_name(n) == simple_name(base))
            }),
            Predicate::InvocationChainContains { names } => {
                chain_members(node).any(|m| names.iter().any(|n| n == m))
            }
            Predicate::NumericValueNotIn { option, default } => {
                let Some(value) = node.text().and_then(parse_numeric) else {
                    return false;
                };
                let allowed = ctx.option_numbers(option).unwrap_or(default.as_slice());
                !allowed.iter().any(|a| (a - value).abs() < f64::EPSILON)
            }
            Predicate::Custom(custom) => (custom.check)(node, ctx),
        }
    }

    /// Option names read as numeric lists, here and in nested predicates
    pub fn numeric_options(&self) -> Vec<&str> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(predicate) = stack.pop() {
            match predicate {
                Predicate::All { of } | Predicate::Any { of } => stack.extend(of),
                Predicate::Not { predicate }
                | Predicate::Parent { predicate }
                | Predicate::Ancestor { predicate }
                | Predicate::Child { predicate }
                | Predicate::Descendant { predicate } => stack.push(predicate),
                Predicate::NumericValueNotIn { option, .. } => found.push(option.as_str()),
                _ => {}
            }
        }
        found
    }

    pub fn all(of: Vec<Predicate>) -> Self {
        Predicate::All { of }
    }

    pub fn any(of: Vec<Predicate>) -> Self {
        Predicate::Any { of }
    }

    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not {
            predicate: Box::new(predicate),
        }
    }

    pub fn kind(kind: NodeKind) -> Self {
        Predicate::KindIs { kind }
    }

    pub fn kind_in(kinds: &[NodeKind]) -> Self {
        Predicate::KindIn {
            kinds: kinds.to_vec(),
        }
    }

    pub fn parent(predicate: Predicate) -> Self {
        Predicate::Parent {
            predicate: Box::new(predicate),
        }
    }

    pub fn ancestor(predicate: Predicate) -> Self {
        Predicate::Ancestor {
            predicate: Box::new(predicate),
        }
    }

    pub fn child(predicate: Predicate) -> Self {
        Predicate::Child {
            predicate: Box::new(predicate),
        }
    }

    pub fn descendant(predicate: Predicate) -> Self {
        Predicate::Descendant {
            predicate: Box::new(predicate),
        }
    }

    pub fn has_modifier(modifier: &str) -> Self {
        Predicate::HasModifier {
            modifier: modifier.to_string(),
        }
    }

    pub fn has_attribute(names: &[&str]) -> Self {
        Predicate::HasAttribute {
            names: strings(names),
        }
    }

    pub fn text_equals(text: &str) -> Self {
        Predicate::TextEquals {
            text: text.to_string(),
        }
    }

    pub fn name_in(names: &[&str]) -> Self {
        Predicate::NameIn {
            names: strings(names),
        }
    }

    pub fn name_ends_with(suffixes: &[&str]) -> Self {
        Predicate::NameEndsWith {
            suffixes: strings(suffixes),
        }
    }

    pub fn member_name_in(names: &[&str]) -> Self {
        Predicate::MemberNameIn {
            names: strings(names),
            option: None,
        }
    }

    pub fn custom(
        name: &str,
        check: impl Fn(&Cursor<'_>, &EvalContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Predicate::Custom(CustomPredicate::new(name, check))
    }

    /// Conjunction with another predicate
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::Always => other,
            Predicate::All { mut of } => {
                of.push(other);
                Predicate::All { of }
            }
            first => Predicate::All {
                of: vec![first, other],
            },
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::Always
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn namespace_has_prefix(namespace: &str, prefix: &str) -> bool {
    namespace == prefix
        || namespace
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Split a numeric literal into its digits and type suffix (`4.5f` -> `4.5`, `f`)
pub(crate) fn split_numeric_suffix(text: &str) -> (&str, &str) {
    let text = text.trim();
    let digits = text
        .trim_end_matches(|c: char| matches!(c, 'd' | 'D' | 'f' | 'F' | 'm' | 'M' | 'l' | 'L' | 'u' | 'U'));
    (digits, &text[digits.len()..])
}

/// Parse a numeric literal, tolerating type suffixes (`8d`, `4.5f`, `10m`)
pub(crate) fn parse_numeric(text: &str) -> Option<f64> {
    let (digits, _) = split_numeric_suffix(text);
    digits.replace('_', "").parse::<f64>().ok()
}

/// Member names along a fluent chain, outermost first
///
/// `await task.ConfigureAwait(false)` yields `ConfigureAwait`;
/// `a.B().C` yields `C`, `B`.
fn chain_members<'t>(node: &Cursor<'t>) -> impl Iterator<Item = &'t str> + 't {
    let mut current = Some(*node);
    let mut steps = 0;
    std::iter::from_fn(move || {
        while let Some(cursor) = current.take() {
            steps += 1;
            if steps > MAX_TREE_DEPTH {
                return None;
            }
            match cursor.kind() {
                NodeKind::AwaitExpression => current = cursor.child(0),
                NodeKind::Invocation => {
                    current = cursor.callee();
                }
                NodeKind::MemberAccess => {
                    current = cursor.receiver();
                    if let Some(name) = cursor.member_name() {
                        return Some(name);
                    }
                }
                _ => return None,
            }
        }
        None
    })
}

/// Inside a static constructor or a static field/property initializer
pub fn static_initializer() -> Predicate {
    Predicate::ancestor(Predicate::any(vec![
        Predicate::kind(NodeKind::ConstructorDecl).and(Predicate::has_modifier("static")),
        Predicate::kind_in(&[NodeKind::FieldDecl, NodeKind::PropertyDecl])
            .and(Predicate::has_modifier("static")),
    ]))
}

/// Inside a constructor of a test class
pub fn test_constructor() -> Predicate {
    Predicate::ancestor(Predicate::kind(NodeKind::ConstructorDecl).and(Predicate::parent(
        Predicate::kind(NodeKind::ClassDecl).and(Predicate::any(vec![
            Predicate::has_attribute(&["TestClass", "TestFixture"]),
            Predicate::name_ends_with(&["Tests", "Test"]),
        ])),
    )))
}

/// Inside a static `Main` entry point
pub fn console_main() -> Predicate {
    Predicate::ancestor(
        Predicate::kind(NodeKind::MethodDecl)
            .and(Predicate::has_modifier("static"))
            .and(Predicate::name_in(&["Main"])),
    )
}

/// Inside a class named `*Decorator`
pub fn decorator_class() -> Predicate {
    within_class_suffix(&["Decorator"])
}

/// Inside a `const` field or local declaration
pub fn const_declaration() -> Predicate {
    Predicate::ancestor(
        Predicate::kind_in(&[NodeKind::FieldDecl, NodeKind::LocalDecl])
            .and(Predicate::has_modifier("const")),
    )
}

/// Inside a class or struct whose name ends with one of the suffixes
pub fn within_class_suffix(suffixes: &[&str]) -> Predicate {
    Predicate::ancestor(
        Predicate::kind_in(&[NodeKind::ClassDecl, NodeKind::StructDecl])
            .and(Predicate::name_ends_with(suffixes)),
    )
}

/// Inside an attribute argument
pub fn attribute_argument() -> Predicate {
    Predicate::ancestor(Predicate::kind(NodeKind::Attribute))
}
