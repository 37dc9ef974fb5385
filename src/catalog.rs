//! Built-in rule set
//!
//! Every rule here is data: triggers, predicates, exceptions, a message
//! template and an optional fix. Hosts that want a different catalogue
//! build their own [`RuleRegistry`] or load rule files on top of this one.

use crate::diagnostic::{FixSafety, Severity};
use crate::fix::{CustomFix, EditOp, FixAction, FixProvider};
use crate::predicate::{
    attribute_argument, console_main, const_declaration, decorator_class, static_initializer,
    test_constructor, within_class_suffix, Predicate,
};
use crate::registry::RuleRegistry;
use crate::rule::{MessageArg, ReportAt, Rule, RuleCategory};
use crate::semantic::SymbolKind;
use crate::syntax::{NodeKind, SyntaxNode};
use std::sync::Arc;

pub const BLOCKING_CALL: &str = "BlockingCall";
pub const NO_COMMAND_PROPERTY: &str = "NoCommandProperty";
pub const HARDCODED_STRING: &str = "HardcodedString";
pub const ASYNC_SUFFIX: &str = "AsyncSuffix";
pub const USE_UTC_NOW: &str = "UseUtcNow";
pub const SPACING_SCALE: &str = "SpacingScale";
pub const NO_STATIC_IO: &str = "NoStaticIo";
pub const MISSING_CONFIGURE_AWAIT: &str = "MissingConfigureAwait";

/// Default spacing scale
pub const DEFAULT_SPACING: [f64; 8] = [0.0, 2.0, 4.0, 8.0, 12.0, 16.0, 24.0, 32.0];

const TASK_TYPES: [&str; 5] = ["Task", "Task`1", "ValueTask", "ValueTask`1", "TaskAwaiter"];
const COMMAND_TYPES: [&str; 7] = [
    "ICommand",
    "IRelayCommand",
    "IAsyncRelayCommand",
    "RelayCommand",
    "AsyncRelayCommand",
    "DelegateCommand",
    "ReactiveCommand",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// All built-in rules in registration order
pub fn builtin_rules() -> Vec<Rule> {
    vec![
        blocking_call(),
        no_command_property(),
        hardcoded_string(),
        async_suffix(),
        use_utc_now(),
        spacing_scale(),
        no_static_io(),
        missing_configure_await(),
    ]
}

/// Registry holding the built-in rules
pub fn builtin_registry() -> RuleRegistry {
    RuleRegistry::from_rules(builtin_rules())
}

fn blocking_call() -> Rule {
    // a member that resolves to something other than a task member
    let non_task_member = Predicate::all(vec![
        Predicate::any(vec![
            Predicate::SymbolKindIs {
                kind: SymbolKind::Property,
            },
            Predicate::SymbolKindIs {
                kind: SymbolKind::Method,
            },
        ]),
        Predicate::not(Predicate::SymbolContainingTypeIn {
            names: strings(&TASK_TYPES),
        }),
    ]);

    Rule::new(
        BLOCKING_CALL,
        "'{0}' blocks on an asynchronous operation; await it instead",
    )
    .with_name("blocking-call")
    .with_description("Synchronous waits on tasks can deadlock and starve the thread pool")
    .with_severity(Severity::Error)
    .with_category(RuleCategory::Perf)
    .with_tag("async")
    .on(&[NodeKind::MemberAccess, NodeKind::Invocation])
    .matching(Predicate::all(vec![
        Predicate::any(vec![
            Predicate::kind(NodeKind::MemberAccess),
            Predicate::child(Predicate::kind(NodeKind::MemberAccess)),
        ]),
        Predicate::MemberNameIn {
            names: strings(&["Result", "Wait", "GetResult", "WaitAll", "WaitAny"]),
            option: Some("additional_methods".to_string()),
        },
    ]))
    .except(static_initializer())
    .except(test_constructor())
    .except(console_main())
    .except(decorator_class())
    .except(non_task_member)
    .with_args(vec![MessageArg::MemberName])
    .report_at(ReportAt::Callee)
    .with_fix(
        FixProvider::new("Use await", "BlockingCall.AwaitInstead", FixAction::AwaitInstead)
            .with_safety(FixSafety::Unsafe),
    )
    .with_rationale(
        "Blocking on a task from a context with a synchronization context deadlocks \
         as soon as the task needs that context to complete.",
    )
    .with_example_bad("var x = task.Result;")
    .with_example_good("var x = await task;")
}

fn no_command_property() -> Rule {
    Rule::new(
        NO_COMMAND_PROPERTY,
        "View model '{0}' exposes command property '{1}'; generate it from a method instead",
    )
    .with_name("no-command-property")
    .with_description("Command properties in view models should be generated, not hand-written")
    .with_severity(Severity::Warning)
    .with_category(RuleCategory::Style)
    .with_tag("mvvm")
    .on(&[NodeKind::PropertyDecl])
    .applies_when(within_class_suffix(&["ViewModel"]))
    .matching(Predicate::any(vec![
        Predicate::TypeImplements {
            interface: "ICommand".to_string(),
        },
        Predicate::TypeNameIn {
            names: strings(&COMMAND_TYPES),
        },
        Predicate::DeclaredTypeIn {
            names: strings(&COMMAND_TYPES),
        },
    ]))
    .with_args(vec![MessageArg::ContainingType, MessageArg::Name])
    .report_at(ReportAt::Name)
    .with_example_bad("public ICommand SaveCommand { get; }")
    .with_example_good("[RelayCommand] private void Save() { }")
}

fn hardcoded_string() -> Rule {
    let ignored_call = Predicate::ancestor(
        Predicate::kind(NodeKind::Invocation).and(Predicate::MemberNameIn {
            names: strings(&["nameof"]),
            option: Some("ignored_calls".to_string()),
        }),
    );

    Rule::new(HARDCODED_STRING, "Hardcoded string \"{0}\"; extract it to a constant")
        .with_name("hardcoded-string")
        .with_description("String literals in code should be named constants or resources")
        .with_severity(Severity::Warning)
        .with_category(RuleCategory::Style)
        .with_tag("maintainability")
        .on(&[NodeKind::StringLiteral])
        .except(const_declaration())
        .except(attribute_argument())
        .except(Predicate::TextIn {
            values: strings(&["", " "]),
        })
        .except(ignored_call)
        .except(within_class_suffix(&["Tests", "Test"]))
        .with_args(vec![MessageArg::Text])
        .with_fix(FixProvider::new(
            "Extract to constant",
            "HardcodedString.ExtractConstant",
            FixAction::ExtractConstant,
        ))
        .with_example_bad("return \"Hello\";")
        .with_example_good("private const string Hello = \"Hello\";\nreturn Hello;")
}

fn async_suffix() -> Rule {
    Rule::new(ASYNC_SUFFIX, "Asynchronous method '{0}' should end with 'Async'")
        .with_name("async-suffix")
        .with_description("Methods returning tasks are named with an Async suffix")
        .with_severity(Severity::Info)
        .with_category(RuleCategory::Style)
        .with_tag("naming")
        .with_tag("async")
        .on(&[NodeKind::MethodDecl])
        .matching(Predicate::all(vec![
            Predicate::any(vec![
                Predicate::has_modifier("async"),
                Predicate::DeclaredTypeIn {
                    names: strings(&["Task", "ValueTask"]),
                },
            ]),
            Predicate::not(Predicate::name_ends_with(&["Async"])),
        ]))
        .except(Predicate::name_in(&["Main"]))
        .except(Predicate::has_modifier("override"))
        .except(Predicate::has_attribute(&["Test", "TestMethod", "Fact", "Theory"]))
        .with_args(vec![MessageArg::Name])
        .report_at(ReportAt::Name)
        .with_fix(
            FixProvider::new(
                "Add 'Async' suffix",
                "AsyncSuffix.Rename",
                FixAction::RenameWithSuffix {
                    suffix: "Async".to_string(),
                },
            )
            .with_safety(FixSafety::Unsafe),
        )
}

fn use_utc_now() -> Rule {
    let clock_types = ["DateTime", "DateTimeOffset"];
    Rule::new(USE_UTC_NOW, "Use 'UtcNow' instead of local time '{0}'")
        .with_name("use-utc-now")
        .with_description("Local wall-clock time depends on the machine's time zone")
        .with_severity(Severity::Warning)
        .with_category(RuleCategory::Suspicious)
        .on(&[NodeKind::MemberAccess])
        .matching(Predicate::all(vec![
            Predicate::member_name_in(&["Now"]),
            Predicate::any(vec![
                Predicate::SymbolContainingTypeIn {
                    names: strings(&clock_types),
                },
                Predicate::child(
                    Predicate::kind(NodeKind::Identifier).and(Predicate::TextIn {
                        values: strings(&clock_types),
                    }),
                ),
                Predicate::child(
                    Predicate::kind(NodeKind::MemberAccess)
                        .and(Predicate::member_name_in(&clock_types)),
                ),
            ]),
        ]))
        .with_args(vec![MessageArg::MemberName])
        .with_fix(
            FixProvider::new(
                "Use UtcNow",
                "UseUtcNow.Replace",
                FixAction::ReplaceText {
                    text: "UtcNow".to_string(),
                },
            )
            .with_safety(FixSafety::Unsafe),
        )
}

fn spacing_scale() -> Rule {
    let spacing_target = Predicate::child(Predicate::MemberNameIn {
        names: strings(&["Margin", "Padding", "Spacing"]),
        option: Some("properties".to_string()),
    });

    Rule::new(SPACING_SCALE, "Spacing value {0} is not on the spacing scale")
        .with_name("spacing-scale")
        .with_description("Layout spacing uses values from the configured scale")
        .with_severity(Severity::Info)
        .with_category(RuleCategory::Pedantic)
        .with_tag("layout")
        .on(&[NodeKind::NumericLiteral])
        .applies_when(Predicate::any(vec![
            Predicate::ancestor(Predicate::kind(NodeKind::Assignment).and(spacing_target)),
            Predicate::ancestor(Predicate::kind(NodeKind::ObjectCreation).and(Predicate::child(
                Predicate::kind(NodeKind::TypeRef).and(Predicate::TextIn {
                    values: strings(&["Thickness"]),
                }),
            ))),
        ]))
        .matching(Predicate::NumericValueNotIn {
            option: "allowed_values".to_string(),
            default: DEFAULT_SPACING.to_vec(),
        })
        .with_args(vec![MessageArg::Text])
        .with_fix(
            FixProvider::new(
                "Snap to the spacing scale",
                "SpacingScale.Snap",
                FixAction::SnapToAllowed {
                    option: "allowed_values".to_string(),
                    default: DEFAULT_SPACING.to_vec(),
                },
            )
            .with_safety(FixSafety::Unsafe),
        )
}

fn no_static_io() -> Rule {
    Rule::new(
        NO_STATIC_IO,
        "Service calls static I/O member '{0}'; inject an abstraction instead",
    )
    .with_name("no-static-io")
    .with_description("Services reach the file system through injected abstractions")
    .with_severity(Severity::Warning)
    .with_category(RuleCategory::Restriction)
    .with_tag("testability")
    .on(&[NodeKind::Invocation, NodeKind::MemberAccess])
    .only_files_ending_with("Service")
    .matching(Predicate::all(vec![
        Predicate::SymbolIsStatic,
        Predicate::SymbolNamespaceHasPrefix {
            prefixes: strings(&["System.IO"]),
            option: Some("forbidden_namespaces".to_string()),
        },
    ]))
    .except(Predicate::SymbolNamespaceHasPrefix {
        prefixes: Vec::new(),
        option: Some("allowed_namespaces".to_string()),
    })
    .with_args(vec![MessageArg::MemberName])
    .report_at(ReportAt::Callee)
}

fn missing_configure_await() -> Rule {
    Rule::new(
        MISSING_CONFIGURE_AWAIT,
        "Awaited task does not call ConfigureAwait",
    )
    .with_name("missing-configure-await")
    .with_description("Library code should not capture the synchronization context")
    .with_severity(Severity::Info)
    .with_category(RuleCategory::Perf)
    .with_tag("async")
    .preview()
    .on(&[NodeKind::AwaitExpression])
    .matching(Predicate::not(Predicate::InvocationChainContains {
        names: strings(&["ConfigureAwait"]),
    }))
    .except(within_class_suffix(&["ViewModel", "Page", "Window", "Tests"]))
    .except(console_main())
    .with_fix(
        FixProvider::new(
            "Add ConfigureAwait(false)",
            "MissingConfigureAwait.Add",
            FixAction::Custom(CustomFix::new("configure_await_false", |node, _| {
                let operand = node.child(0)?;
                Some(vec![EditOp::replace(&operand, configure_await(operand.node()))])
            })),
        )
        .with_safety(FixSafety::Unsafe),
    )
}

/// `<operand>.ConfigureAwait(false)`
fn configure_await(operand: &Arc<SyntaxNode>) -> Arc<SyntaxNode> {
    let access = SyntaxNode::detached(NodeKind::MemberAccess)
        .with_child(Arc::clone(operand))
        .with_child(
            SyntaxNode::detached(NodeKind::Identifier)
                .with_text("ConfigureAwait")
                .into_arc(),
        );
    let arguments = SyntaxNode::detached(NodeKind::ArgumentList).with_child(
        SyntaxNode::detached(NodeKind::Argument)
            .with_child(
                SyntaxNode::detached(NodeKind::Identifier)
                    .with_text("false")
                    .into_arc(),
            )
            .into_arc(),
    );
    SyntaxNode::detached(NodeKind::Invocation)
        .with_child(access.into_arc())
        .with_child(arguments.into_arc())
        .into_arc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::semantic::{SemanticModel, Symbol, TypeRef};
    use crate::session::AnalysisSession;
    use crate::syntax::{NodeBuilder, SyntaxTree};

    fn run(tree: &SyntaxTree, symbols: &SemanticModel) -> Vec<(String, String)> {
        let mut config = Config::default();
        config.preview = true;
        AnalysisSession::new(Arc::new(builtin_registry()), &config)
            .run(tree, symbols)
            .unwrap()
            .findings
            .into_iter()
            .map(|f| (f.rule_id, f.message))
            .collect()
    }

    fn ids(findings: &[(String, String)]) -> Vec<&str> {
        findings.iter().map(|(id, _)| id.as_str()).collect()
    }

    fn class(name: &str, members: Vec<NodeBuilder>) -> NodeBuilder {
        NodeBuilder::new(NodeKind::ClassDecl)
            .child(NodeBuilder::modifier("public"))
            .child(NodeBuilder::ident(name))
            .children(members)
    }

    fn method(modifiers: &[&str], ret: &str, name: &str, body: Vec<NodeBuilder>) -> NodeBuilder {
        NodeBuilder::new(NodeKind::MethodDecl)
            .children(modifiers.iter().map(|m| NodeBuilder::modifier(m)))
            .child(NodeBuilder::type_ref(ret))
            .child(NodeBuilder::ident(name))
            .child(NodeBuilder::new(NodeKind::Block).children(body))
    }

    fn access(receiver: &str, member: &str) -> NodeBuilder {
        NodeBuilder::new(NodeKind::MemberAccess)
            .child(NodeBuilder::ident(receiver))
            .child(NodeBuilder::ident(member))
    }

    fn call(callee: NodeBuilder) -> NodeBuilder {
        NodeBuilder::new(NodeKind::Invocation)
            .child(callee)
            .child(NodeBuilder::new(NodeKind::ArgumentList))
    }

    fn statement(expr: NodeBuilder) -> NodeBuilder {
        NodeBuilder::new(NodeKind::ExpressionStatement).child(expr)
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), builtin_rules().len());
        for id in [
            BLOCKING_CALL,
            NO_COMMAND_PROPERTY,
            HARDCODED_STRING,
            ASYNC_SUFFIX,
            USE_UTC_NOW,
            SPACING_SCALE,
            NO_STATIC_IO,
            MISSING_CONFIGURE_AWAIT,
        ] {
            assert!(registry.get(id).is_some(), "{} missing", id);
        }
    }

    #[test]
    fn test_wait_call_is_reported_once() {
        let root = class(
            "Worker",
            vec![method(&[], "void", "Run", vec![statement(call(access("task", "Wait")))])],
        )
        .build();
        let tree = SyntaxTree::new("Worker.cs", root).unwrap();
        let findings = run(&tree, &SemanticModel::empty());

        assert_eq!(ids(&findings), vec![BLOCKING_CALL]);
        assert_eq!(
            findings[0].1,
            "'Wait' blocks on an asynchronous operation; await it instead"
        );
    }

    #[test]
    fn test_result_on_non_task_member_is_ignored() {
        let root = class(
            "Worker",
            vec![method(&[], "void", "Run", vec![statement(access("response", "Result"))])],
        )
        .build();
        let tree = SyntaxTree::new("Worker.cs", root).unwrap();
        let result = tree.nodes_of_kind(&NodeKind::MemberAccess).next().unwrap();
        let symbols = SemanticModel::empty().with_symbol(
            &result,
            Symbol::new("Result", SymbolKind::Property).with_containing_type("HttpResponse"),
        );

        assert!(run(&tree, &symbols).is_empty());
        assert_eq!(ids(&run(&tree, &SemanticModel::empty())), vec![BLOCKING_CALL]);
    }

    #[test]
    fn test_blocking_call_exception_contexts() {
        let blocking = || statement(access("task", "Result"));
        let contexts = vec![
            class(
                "Startup",
                vec![NodeBuilder::new(NodeKind::ConstructorDecl)
                    .child(NodeBuilder::modifier("static"))
                    .child(NodeBuilder::ident("Startup"))
                    .child(NodeBuilder::new(NodeKind::Block).child(blocking()))],
            ),
            class(
                "ParserTests",
                vec![NodeBuilder::new(NodeKind::ConstructorDecl)
                    .child(NodeBuilder::ident("ParserTests"))
                    .child(NodeBuilder::new(NodeKind::Block).child(blocking()))],
            ),
            class(
                "Program",
                vec![method(&["static"], "void", "Main", vec![blocking()])],
            ),
            class(
                "CachingDecorator",
                vec![method(&["public"], "int", "Get", vec![blocking()])],
            ),
        ];

        for context in contexts {
            let tree = SyntaxTree::new("Ctx.cs", context.build()).unwrap();
            let findings = run(&tree, &SemanticModel::empty());
            assert!(!ids(&findings).contains(&BLOCKING_CALL), "{}", tree.root().render());
        }
    }

    #[test]
    fn test_async_suffix() {
        let root = class(
            "Loader",
            vec![
                method(&["public", "async"], "Task", "Load", vec![]),
                method(&["public"], "Task<int>", "CountAsync", vec![]),
                method(&["public", "override"], "Task", "Run", vec![]),
                method(&["public"], "int", "Count", vec![]),
            ],
        )
        .build();
        let tree = SyntaxTree::new("Loader.cs", root).unwrap();
        let findings = run(&tree, &SemanticModel::empty());

        assert_eq!(ids(&findings), vec![ASYNC_SUFFIX]);
        assert!(findings[0].1.contains("'Load'"));
    }

    #[test]
    fn test_utc_now() {
        let root = class(
            "Clock",
            vec![method(
                &[],
                "void",
                "Tick",
                vec![statement(access("DateTime", "Now")), statement(access("DateTime", "UtcNow"))],
            )],
        )
        .build();
        let tree = SyntaxTree::new("Clock.cs", root).unwrap();
        assert_eq!(ids(&run(&tree, &SemanticModel::empty())), vec![USE_UTC_NOW]);
    }

    #[test]
    fn test_spacing_scale_uses_configured_values() {
        let assign = |value: &str| {
            statement(
                NodeBuilder::new(NodeKind::Assignment)
                    .child(access("panel", "Margin"))
                    .child(NodeBuilder::number(value)),
            )
        };
        let root = class(
            "Layout",
            vec![method(&[], "void", "Build", vec![assign("8"), assign("10")])],
        )
        .build();
        let tree = SyntaxTree::new("Layout.cs", root).unwrap();
        let findings = run(&tree, &SemanticModel::empty());
        assert_eq!(ids(&findings), vec![SPACING_SCALE]);
        assert!(findings[0].1.contains("10"));

        let mut config = Config::default();
        config.options.insert(
            "SpacingScale.allowed_values".to_string(),
            serde_yaml::Value::String("5, 10".to_string()),
        );
        let report = AnalysisSession::new(Arc::new(builtin_registry()), &config)
            .run(&tree, &SemanticModel::empty())
            .unwrap();
        let spacing: Vec<_> = report.findings_for(SPACING_SCALE).collect();
        assert_eq!(spacing.len(), 1);
        assert!(spacing[0].message.contains('8'));
    }

    #[test]
    fn test_spacing_scale_keeps_valid_configured_values() {
        let rule = spacing_scale();
        assert_eq!(rule.numeric_options(), vec!["allowed_values"]);

        let root = class(
            "Layout",
            vec![method(
                &[],
                "void",
                "Build",
                vec![statement(
                    NodeBuilder::new(NodeKind::Assignment)
                        .child(access("panel", "Margin"))
                        .child(NodeBuilder::number("10")),
                )],
            )],
        )
        .build();
        let tree = SyntaxTree::new("Layout.cs", root).unwrap();
        let mut config = Config::default();
        config.options.insert(
            "SpacingScale.allowed_values".to_string(),
            serde_yaml::Value::String("5, ten, 10".to_string()),
        );
        let report = AnalysisSession::new(Arc::new(builtin_registry()), &config)
            .run(&tree, &SemanticModel::empty())
            .unwrap();
        // "ten" is skipped; 10 is still on the configured scale
        assert_eq!(report.findings_for(SPACING_SCALE).count(), 0);
    }

    #[test]
    fn test_static_io_only_in_services() {
        let body = || vec![statement(call(access("File", "ReadAllText")))];
        let symbols_for = |tree: &SyntaxTree| {
            let invocation = tree.nodes_of_kind(&NodeKind::Invocation).next().unwrap();
            SemanticModel::empty().with_symbol(
                &invocation,
                Symbol::new("ReadAllText", SymbolKind::Method)
                    .with_static(true)
                    .with_containing_type("File")
                    .with_namespace("System.IO"),
            )
        };

        let service = SyntaxTree::new(
            "src/OrderService.cs",
            class("OrderService", vec![method(&[], "void", "Load", body())]).build(),
        )
        .unwrap();
        let findings = run(&service, &symbols_for(&service));
        assert_eq!(ids(&findings), vec![NO_STATIC_IO]);

        let other = SyntaxTree::new(
            "src/OrderRepository.cs",
            class("OrderRepository", vec![method(&[], "void", "Load", body())]).build(),
        )
        .unwrap();
        assert!(run(&other, &symbols_for(&other)).is_empty());
    }

    #[test]
    fn test_configure_await_preview_rule_and_fix() {
        let awaited = NodeBuilder::new(NodeKind::AwaitExpression).child(call(access("client", "SendAsync")));
        let root = class(
            "Client",
            vec![method(&["public", "async"], "Task", "SendAsync", vec![statement(awaited)])],
        )
        .build();
        let tree = SyntaxTree::new("Client.cs", root).unwrap();
        assert_eq!(ids(&run(&tree, &SemanticModel::empty())), vec![MISSING_CONFIGURE_AWAIT]);

        // preview rules stay off by default
        let report = AnalysisSession::new(Arc::new(builtin_registry()), &Config::default())
            .run(&tree, &SemanticModel::empty())
            .unwrap();
        assert!(report.findings.is_empty());

        let node = tree.nodes_of_kind(&NodeKind::AwaitExpression).next().unwrap();
        let operand = configure_await(node.child(0).unwrap().node());
        assert_eq!(operand.children[0].children[1].text.as_deref(), Some("ConfigureAwait"));
    }

    #[test]
    fn test_command_property_with_semantic_type() {
        let property = NodeBuilder::new(NodeKind::PropertyDecl)
            .child(NodeBuilder::modifier("public"))
            .child(NodeBuilder::type_ref("IMyCommand"))
            .child(NodeBuilder::ident("Save"));
        let tree = SyntaxTree::new(
            "FooViewModel.cs",
            class("FooViewModel", vec![property]).build(),
        )
        .unwrap();
        let prop = tree.nodes_of_kind(&NodeKind::PropertyDecl).next().unwrap();
        let symbols = SemanticModel::empty()
            .with_type(&prop, TypeRef::new("IMyCommand").with_interface("System.Windows.Input.ICommand"));

        let findings = run(&tree, &symbols);
        assert_eq!(ids(&findings), vec![NO_COMMAND_PROPERTY]);
        assert_eq!(
            findings[0].1,
            "View model 'FooViewModel' exposes command property 'Save'; generate it from a method instead"
        );
    }
}
