//! Fix providers: turn a reported node into edit operations

use super::{EditOp, InsertPosition};
use crate::diagnostic::FixSafety;
use crate::options::RuleOptions;
use crate::predicate::{parse_numeric, split_numeric_suffix};
use crate::semantic::{SymbolContext, SymbolKind};
use crate::syntax::{Cursor, NodeKind, SyntaxNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Inputs available to a fix provider
#[derive(Clone, Copy)]
pub struct FixContext<'a> {
    pub symbols: &'a dyn SymbolContext,
    pub options: &'a RuleOptions,
    pub rule_id: &'a str,
    /// Message arguments of the finding being fixed
    pub args: &'a [String],
}

type FixFn = dyn Fn(&Cursor<'_>, &FixContext<'_>) -> Option<Vec<EditOp>> + Send + Sync;

/// Closure-backed fix for rewrites the declarative actions cannot express
#[derive(Clone)]
pub struct CustomFix {
    name: String,
    compute: Arc<FixFn>,
}

impl CustomFix {
    pub fn new(
        name: &str,
        compute: impl Fn(&Cursor<'_>, &FixContext<'_>) -> Option<Vec<EditOp>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            compute: Arc::new(compute),
        }
    }
}

impl fmt::Debug for CustomFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomFix({})", self.name)
    }
}

/// Declarative rewrite applied at the reported node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixAction {
    /// Replace the text of the node's name identifier (or the node itself)
    ReplaceText { text: String },
    /// Append a suffix to the declared name
    RenameWithSuffix { suffix: String },
    /// Move a string literal into a `const` field of the enclosing type
    ExtractConstant,
    /// Replace a blocking wait with `await` and mark the method `async`
    AwaitInstead,
    /// Replace a numeric literal with the nearest allowed value
    SnapToAllowed { option: String, default: Vec<f64> },
    /// Delete the node
    Remove,
    #[serde(skip)]
    Custom(CustomFix),
}

/// Fix attached to a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixProvider {
    /// Code action title shown to the user
    pub title: String,
    /// Groups fixes that can be applied together in a fix-all
    pub equivalence_key: String,
    #[serde(default)]
    pub safety: FixSafety,
    pub action: FixAction,
}

impl FixProvider {
    pub fn new(title: &str, equivalence_key: &str, action: FixAction) -> Self {
        Self {
            title: title.to_string(),
            equivalence_key: equivalence_key.to_string(),
            safety: FixSafety::Safe,
            action,
        }
    }

    pub fn with_safety(mut self, safety: FixSafety) -> Self {
        self.safety = safety;
        self
    }

    /// Compute edit operations for the reported node; `None` when no fix applies
    pub fn compute(&self, node: &Cursor<'_>, ctx: &FixContext<'_>) -> Option<Vec<EditOp>> {
        let ops = match &self.action {
            FixAction::ReplaceText { text } => replace_text(node, text),
            FixAction::RenameWithSuffix { suffix } => rename_with_suffix(node, suffix),
            FixAction::ExtractConstant => extract_constant(node),
            FixAction::AwaitInstead => await_instead(node, ctx.symbols),
            FixAction::SnapToAllowed { option, default } => {
                let allowed = ctx.options.numbers(ctx.rule_id, option).unwrap_or(default.as_slice());
                snap_to_allowed(node, allowed)
            }
            FixAction::Remove => node.parent().map(|_| vec![EditOp::remove(node)]),
            FixAction::Custom(custom) => (custom.compute)(node, ctx),
        }?;
        (!ops.is_empty()).then_some(ops)
    }
}

fn replace_text(node: &Cursor<'_>, text: &str) -> Option<Vec<EditOp>> {
    let target = node
        .name_identifier()
        .or_else(|| node.text().map(|_| *node))?;
    if target.text() == Some(text) {
        return None;
    }
    let replacement = SyntaxNode::detached(target.kind().clone()).with_text(text);
    Some(vec![EditOp::replace(&target, replacement.into_arc())])
}

fn rename_with_suffix(node: &Cursor<'_>, suffix: &str) -> Option<Vec<EditOp>> {
    let ident = node.name_identifier()?;
    let name = ident.text()?;
    if name.ends_with(suffix) {
        return None;
    }
    let renamed = SyntaxNode::detached(NodeKind::Identifier).with_text(&format!("{}{}", name, suffix));
    Some(vec![EditOp::replace(&ident, renamed.into_arc())])
}

/// PascalCase identifier derived from a literal value
///
/// `"hello, world"` becomes `HelloWorld`; values without letters become
/// `Text`, and a leading digit gets a `Text` prefix.
pub fn constant_name(value: &str) -> String {
    const MAX_LEN: usize = 40;
    let value = value.trim_matches('"');
    let mut name = String::new();
    for word in value.split(|c: char| !c.is_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
        if name.chars().count() >= MAX_LEN {
            break;
        }
    }
    let name: String = name.chars().take(MAX_LEN).collect();
    if name.is_empty() {
        "Text".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Text{}", name)
    } else {
        name
    }
}

fn const_field(name: &str, value: &str) -> Arc<SyntaxNode> {
    SyntaxNode::detached(NodeKind::FieldDecl)
        .with_child(
            SyntaxNode::detached(NodeKind::Modifier)
                .with_text("private")
                .into_arc(),
        )
        .with_child(SyntaxNode::detached(NodeKind::Modifier).with_text("const").into_arc())
        .with_child(SyntaxNode::detached(NodeKind::TypeRef).with_text("string").into_arc())
        .with_child(
            SyntaxNode::detached(NodeKind::VariableDeclarator)
                .with_child(SyntaxNode::detached(NodeKind::Identifier).with_text(name).into_arc())
                .with_child(
                    SyntaxNode::detached(NodeKind::StringLiteral)
                        .with_text(value)
                        .into_arc(),
                )
                .into_arc(),
        )
        .into_arc()
}

/// Value of a `const` string field, if `member` is one
fn const_string_value<'t>(member: &Cursor<'t>) -> Option<&'t str> {
    if !member.is(&NodeKind::FieldDecl) || !member.has_modifier("const") {
        return None;
    }
    member
        .first_child_of_kind(&NodeKind::VariableDeclarator)?
        .first_child_of_kind(&NodeKind::StringLiteral)?
        .text()
}

fn extract_constant(node: &Cursor<'_>) -> Option<Vec<EditOp>> {
    if !node.is(&NodeKind::StringLiteral) {
        return None;
    }
    let value = node.text()?;
    let container = node.nearest_ancestor(&[NodeKind::ClassDecl, NodeKind::StructDecl])?;
    let base = constant_name(value);

    for attempt in 1..=100 {
        let name = if attempt == 1 {
            base.clone()
        } else {
            format!("{}{}", base, attempt)
        };
        let existing = container
            .children()
            .find(|member| member.kind().starts_line() && member.name() == Some(name.as_str()));

        let reference = SyntaxNode::detached(NodeKind::Identifier).with_text(&name);
        match existing {
            None => {
                return Some(vec![
                    EditOp::replace(node, reference.into_arc()),
                    EditOp::insert(&container, const_field(&name, value), InsertPosition::SortedByName),
                ]);
            }
            Some(member) if const_string_value(&member) == Some(value) => {
                return Some(vec![EditOp::replace(node, reference.into_arc())]);
            }
            Some(_) => continue,
        }
    }
    None
}

/// Task types whose static members take tasks as arguments
const TASK_TYPE_NAMES: [&str; 2] = ["Task", "ValueTask"];

/// Whether `receiver` names a type rather than a task value
fn names_type(receiver: &Cursor<'_>, symbols: &dyn SymbolContext) -> bool {
    if let Some(symbol) = symbols.symbol(receiver) {
        return symbol.kind == SymbolKind::Type;
    }
    let name = match receiver.kind() {
        NodeKind::Identifier => receiver.text(),
        NodeKind::MemberAccess => receiver.member_name(),
        _ => None,
    };
    name.is_some_and(|n| TASK_TYPE_NAMES.contains(&n))
}

fn has_arguments(call: &Cursor<'_>) -> bool {
    call.first_child_of_kind(&NodeKind::ArgumentList)
        .is_some_and(|args| args.children().next().is_some())
}

/// The awaited expression for a blocking wait
///
/// `task.Result` and `task.Wait()` yield `task`;
/// `task.GetAwaiter().GetResult()` yields `task`.
fn awaited_operand<'t>(access: &Cursor<'t>) -> Option<Cursor<'t>> {
    let receiver = access.receiver()?;
    if access.member_name() == Some("GetResult") && receiver.is(&NodeKind::Invocation) {
        if let Some(callee) = receiver.callee() {
            if callee.member_name() == Some("GetAwaiter") {
                return callee.receiver();
            }
        }
    }
    Some(receiver)
}

/// `Task.WaitAll(a, b)` becomes `Task.WhenAll(a, b)`, keeping the arguments
fn when_combinator(call: &Cursor<'_>, receiver: &Cursor<'_>, member: &str) -> Option<Arc<SyntaxNode>> {
    let combinator = match member {
        "WaitAll" => "WhenAll",
        "WaitAny" => "WhenAny",
        _ => return None,
    };
    if !has_arguments(call) {
        return None;
    }
    let arguments = call.first_child_of_kind(&NodeKind::ArgumentList)?;
    let callee = SyntaxNode::detached(NodeKind::MemberAccess)
        .with_child(Arc::clone(receiver.node()))
        .with_child(
            SyntaxNode::detached(NodeKind::Identifier)
                .with_text(combinator)
                .into_arc(),
        );
    Some(
        SyntaxNode::detached(NodeKind::Invocation)
            .with_child(callee.into_arc())
            .with_child(Arc::clone(arguments.node()))
            .into_arc(),
    )
}

fn await_instead(node: &Cursor<'_>, symbols: &dyn SymbolContext) -> Option<Vec<EditOp>> {
    let access = match node.kind() {
        NodeKind::MemberAccess => *node,
        NodeKind::Invocation => node.callee().filter(|c| c.is(&NodeKind::MemberAccess))?,
        _ => return None,
    };
    let member = access.member_name()?;
    let receiver = access.receiver()?;
    let call = access
        .parent()
        .filter(|p| p.is(&NodeKind::Invocation) && p.callee() == Some(access));

    // `task.Wait()` is replaced as a whole call, `task.Result` as an access
    let (replaced, operand) = match call {
        Some(call) if names_type(&receiver, symbols) => {
            (call, when_combinator(&call, &receiver, member)?)
        }
        Some(call) => {
            // `Wait(timeout)` and friends have no awaitable equivalent
            if has_arguments(&call) {
                return None;
            }
            let operand = awaited_operand(&access)?;
            (call, Arc::clone(operand.node()))
        }
        None if names_type(&receiver, symbols) => return None,
        None => (access, Arc::clone(receiver.node())),
    };

    let method = replaced.nearest_ancestor(&[
        NodeKind::MethodDecl,
        NodeKind::ConstructorDecl,
        NodeKind::PropertyDecl,
    ])?;
    if !method.is(&NodeKind::MethodDecl) {
        return None;
    }

    let awaited = SyntaxNode::detached(NodeKind::AwaitExpression).with_child(operand);
    let mut ops = vec![EditOp::replace(&replaced, awaited.into_arc())];
    if !method.has_modifier("async") {
        let modifier = SyntaxNode::detached(NodeKind::Modifier).with_text("async");
        ops.push(EditOp::insert(
            &method,
            modifier.into_arc(),
            InsertPosition::Before(NodeKind::TypeRef),
        ));
    }
    Some(ops)
}

/// Nearest allowed value; ties resolve to the smaller one
pub fn nearest_allowed(value: f64, allowed: &[f64]) -> Option<f64> {
    allowed.iter().copied().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(b) => {
            let (db, dc) = ((value - b).abs(), (value - candidate).abs());
            if dc < db || (dc == db && candidate < b) {
                Some(candidate)
            } else {
                Some(b)
            }
        }
    })
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn snap_to_allowed(node: &Cursor<'_>, allowed: &[f64]) -> Option<Vec<EditOp>> {
    if !node.is(&NodeKind::NumericLiteral) {
        return None;
    }
    let text = node.text()?;
    let value = parse_numeric(text)?;
    let snapped = nearest_allowed(value, allowed)?;
    if snapped == value {
        return None;
    }
    let (_, suffix) = split_numeric_suffix(text);
    let literal = SyntaxNode::detached(NodeKind::NumericLiteral)
        .with_text(&format!("{}{}", format_number(snapped), suffix));
    Some(vec![EditOp::replace(node, literal.into_arc())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::SemanticModel;
    use crate::syntax::{NodeBuilder, SyntaxTree};

    fn compute(tree: &SyntaxTree, kind: NodeKind, action: FixAction) -> Option<Vec<EditOp>> {
        let provider = FixProvider::new("fix", "Test.fix", action);
        let symbols = SemanticModel::empty();
        let options = RuleOptions::new();
        let ctx = FixContext {
            symbols: &symbols,
            options: &options,
            rule_id: "Test",
            args: &[],
        };
        let node = tree.nodes_of_kind(&kind).next().unwrap();
        provider.compute(&node, &ctx)
    }

    #[test]
    fn test_constant_name() {
        assert_eq!(constant_name("Hello world"), "HelloWorld");
        assert_eq!(constant_name("\"save-failed\""), "SaveFailed");
        assert_eq!(constant_name("404 not found"), "Text404NotFound");
        assert_eq!(constant_name("!!!"), "Text");
    }

    #[test]
    fn test_nearest_allowed() {
        let scale = [0.0, 4.0, 8.0, 16.0];
        assert_eq!(nearest_allowed(5.0, &scale), Some(4.0));
        assert_eq!(nearest_allowed(6.0, &scale), Some(4.0));
        assert_eq!(nearest_allowed(7.0, &scale), Some(8.0));
        assert_eq!(nearest_allowed(100.0, &scale), Some(16.0));
        assert_eq!(nearest_allowed(1.0, &[]), None);
    }

    #[test]
    fn test_extract_constant_reuses_matching_const() {
        let root = NodeBuilder::new(NodeKind::ClassDecl)
            .child(NodeBuilder::ident("Greeter"))
            .child(
                NodeBuilder::new(NodeKind::FieldDecl)
                    .child(NodeBuilder::modifier("const"))
                    .child(NodeBuilder::type_ref("string"))
                    .child(
                        NodeBuilder::new(NodeKind::VariableDeclarator)
                            .child(NodeBuilder::ident("Hello"))
                            .child(NodeBuilder::string("Hello")),
                    ),
            )
            .child(
                NodeBuilder::new(NodeKind::MethodDecl)
                    .child(NodeBuilder::type_ref("string"))
                    .child(NodeBuilder::ident("Greet"))
                    .child(
                        NodeBuilder::new(NodeKind::Block).child(
                            NodeBuilder::new(NodeKind::ReturnStatement)
                                .child(NodeBuilder::string("Hello")),
                        ),
                    ),
            )
            .build();
        let tree = SyntaxTree::new("Greeter.cs", root).unwrap();
        let literal = tree
            .nodes_of_kind(&NodeKind::StringLiteral)
            .nth(1)
            .unwrap();
        let provider = FixProvider::new("fix", "k", FixAction::ExtractConstant);
        let symbols = SemanticModel::empty();
        let options = RuleOptions::new();
        let ctx = FixContext {
            symbols: &symbols,
            options: &options,
            rule_id: "HardcodedString",
            args: &[],
        };
        let ops = provider.compute(&literal, &ctx).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], EditOp::Replace { .. }));
    }

    #[test]
    fn test_extract_constant_avoids_name_clash() {
        let root = NodeBuilder::new(NodeKind::ClassDecl)
            .child(NodeBuilder::ident("Greeter"))
            .child(
                NodeBuilder::new(NodeKind::PropertyDecl)
                    .child(NodeBuilder::type_ref("string"))
                    .child(NodeBuilder::ident("Hello")),
            )
            .child(
                NodeBuilder::new(NodeKind::ReturnStatement).child(NodeBuilder::string("Hello")),
            )
            .build();
        let tree = SyntaxTree::new("Greeter.cs", root).unwrap();
        let ops = compute(&tree, NodeKind::StringLiteral, FixAction::ExtractConstant).unwrap();
        match &ops[1] {
            EditOp::Insert { child, .. } => assert_eq!(child.name(), Some("Hello2")),
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_await_instead_on_wait_call() {
        // void Save() { task.Wait(); }
        let root = NodeBuilder::new(NodeKind::MethodDecl)
            .child(NodeBuilder::type_ref("void"))
            .child(NodeBuilder::ident("Save"))
            .child(
                NodeBuilder::new(NodeKind::Block).child(
                    NodeBuilder::new(NodeKind::ExpressionStatement).child(
                        NodeBuilder::new(NodeKind::Invocation)
                            .child(
                                NodeBuilder::new(NodeKind::MemberAccess)
                                    .child(NodeBuilder::ident("task"))
                                    .child(NodeBuilder::ident("Wait")),
                            )
                            .child(NodeBuilder::new(NodeKind::ArgumentList)),
                    ),
                ),
            )
            .build();
        let tree = SyntaxTree::new("Saver.cs", root).unwrap();
        let ops = compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).unwrap();
        assert_eq!(ops.len(), 2);
        match &ops[0] {
            EditOp::Replace {
                target,
                replacement,
            } => {
                assert_eq!(target.kind, NodeKind::Invocation);
                assert_eq!(replacement.kind, NodeKind::AwaitExpression);
                assert_eq!(replacement.children[0].text.as_deref(), Some("task"));
            }
            other => panic!("expected replace, got {:?}", other),
        }
        assert!(matches!(&ops[1], EditOp::Insert { child, .. } if child.text.as_deref() == Some("async")));
    }

    /// `void Run() { <receiver>.<member>(<args>); }`
    fn static_wait(receiver: &str, member: &str, args: &[&str]) -> SyntaxTree {
        let arguments = NodeBuilder::new(NodeKind::ArgumentList).children(
            args.iter()
                .map(|a| NodeBuilder::new(NodeKind::Argument).child(NodeBuilder::ident(a))),
        );
        let root = NodeBuilder::new(NodeKind::MethodDecl)
            .child(NodeBuilder::type_ref("void"))
            .child(NodeBuilder::ident("Run"))
            .child(
                NodeBuilder::new(NodeKind::Block).child(
                    NodeBuilder::new(NodeKind::ExpressionStatement).child(
                        NodeBuilder::new(NodeKind::Invocation)
                            .child(
                                NodeBuilder::new(NodeKind::MemberAccess)
                                    .child(NodeBuilder::ident(receiver))
                                    .child(NodeBuilder::ident(member)),
                            )
                            .child(arguments),
                    ),
                ),
            )
            .build();
        SyntaxTree::new("Runner.cs", root).unwrap()
    }

    #[test]
    fn test_await_instead_maps_wait_all_to_when_all() {
        let tree = static_wait("Task", "WaitAll", &["t1", "t2"]);
        let ops = compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).unwrap();
        let EditOp::Replace { target, replacement } = &ops[0] else {
            panic!("expected replace, got {:?}", ops[0]);
        };
        assert_eq!(target.kind, NodeKind::Invocation);
        assert_eq!(
            replacement.render(),
            "(await_expression)\n  (invocation)\n    (member_access)\n      (identifier \"Task\")\n      \
             (identifier \"WhenAll\")\n    (argument_list)\n      (argument)\n        (identifier \"t1\")\n      \
             (argument)\n        (identifier \"t2\")\n"
        );
    }

    #[test]
    fn test_await_instead_maps_wait_any_to_when_any() {
        let tree = static_wait("Task", "WaitAny", &["t1"]);
        let ops = compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).unwrap();
        let EditOp::Replace { replacement, .. } = &ops[0] else {
            panic!("expected replace, got {:?}", ops[0]);
        };
        let callee = &replacement.children[0].children[0];
        assert_eq!(callee.children[1].text.as_deref(), Some("WhenAny"));
        assert_eq!(replacement.children[0].children[1].children.len(), 1);
    }

    #[test]
    fn test_await_instead_keeps_user_code() {
        // a timeout has no awaitable equivalent
        let tree = static_wait("task", "Wait", &["timeout"]);
        assert!(compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).is_none());
        // static waits without tasks to await
        let tree = static_wait("Task", "WaitAll", &[]);
        assert!(compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).is_none());
        // a blocking member on a type, not a task value
        let tree = static_wait("Task", "Wait", &[]);
        assert!(compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).is_none());
    }

    #[test]
    fn test_snap_to_allowed_keeps_type_suffix() {
        let root = NodeBuilder::new(NodeKind::Assignment)
            .child(NodeBuilder::ident("Margin"))
            .child(NodeBuilder::number("6d"))
            .build();
        let tree = SyntaxTree::new("a.cs", root).unwrap();
        let action = FixAction::SnapToAllowed {
            option: "allowed_values".to_string(),
            default: vec![0.0, 4.0, 8.0],
        };
        let ops = compute(&tree, NodeKind::NumericLiteral, action).unwrap();
        let EditOp::Replace { replacement, .. } = &ops[0] else {
            panic!("expected replace, got {:?}", ops[0]);
        };
        assert_eq!(replacement.text.as_deref(), Some("4d"));
    }

    #[test]
    fn test_await_instead_outside_method_has_no_fix() {
        let root = NodeBuilder::new(NodeKind::FieldDecl)
            .child(NodeBuilder::type_ref("int"))
            .child(
                NodeBuilder::new(NodeKind::MemberAccess)
                    .child(NodeBuilder::ident("task"))
                    .child(NodeBuilder::ident("Result")),
            )
            .build();
        let tree = SyntaxTree::new("a.cs", root).unwrap();
        assert!(compute(&tree, NodeKind::MemberAccess, FixAction::AwaitInstead).is_none());
    }

    #[test]
    fn test_rename_with_suffix_is_idempotent() {
        let method = |name: &str| {
            let root = NodeBuilder::new(NodeKind::MethodDecl)
                .child(NodeBuilder::type_ref("Task"))
                .child(NodeBuilder::ident(name))
                .build();
            SyntaxTree::new("a.cs", root).unwrap()
        };
        let action = || FixAction::RenameWithSuffix {
            suffix: "Async".to_string(),
        };
        assert!(compute(&method("Load"), NodeKind::MethodDecl, action()).is_some());
        assert!(compute(&method("LoadAsync"), NodeKind::MethodDecl, action()).is_none());
    }

    #[test]
    fn test_remove_root_has_no_fix() {
        let tree = SyntaxTree::new("a.cs", NodeBuilder::new(NodeKind::Block).build()).unwrap();
        assert!(compute(&tree, NodeKind::Block, FixAction::Remove).is_none());
    }
}
