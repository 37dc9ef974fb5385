//! Rule definition and evaluation

use crate::diagnostic::Severity;
use crate::fix::{FixAction, FixProvider};
use crate::predicate::{EvalContext, Predicate};
use crate::syntax::{Cursor, NodeKind};
use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rule category for grouping related rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Code that is definitely wrong
    Correctness,
    /// Code that is likely wrong or suspicious
    Suspicious,
    /// Idiomatic and consistent style rules
    #[default]
    Style,
    /// Runtime performance and responsiveness
    Perf,
    /// Extra strict rules that may have false positives
    Pedantic,
    /// Rules that ban specific patterns or APIs
    Restriction,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Correctness => write!(f, "correctness"),
            RuleCategory::Suspicious => write!(f, "suspicious"),
            RuleCategory::Style => write!(f, "style"),
            RuleCategory::Perf => write!(f, "perf"),
            RuleCategory::Pedantic => write!(f, "pedantic"),
            RuleCategory::Restriction => write!(f, "restriction"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "correctness" => Ok(RuleCategory::Correctness),
            "suspicious" => Ok(RuleCategory::Suspicious),
            "style" => Ok(RuleCategory::Style),
            "perf" | "performance" => Ok(RuleCategory::Perf),
            "pedantic" => Ok(RuleCategory::Pedantic),
            "restriction" => Ok(RuleCategory::Restriction),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Rule stability level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleStability {
    #[default]
    Stable,
    /// Off unless preview rules are enabled
    Preview,
    Deprecated,
}

impl fmt::Display for RuleStability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStability::Stable => write!(f, "stable"),
            RuleStability::Preview => write!(f, "preview"),
            RuleStability::Deprecated => write!(f, "deprecated"),
        }
    }
}

/// Which files a rule runs on
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFilter {
    /// File stem must end with one of these (e.g. `Service`)
    pub name_suffixes: Vec<String>,
    /// Path must match one of these globs
    pub globs: Vec<String>,
}

impl FileFilter {
    pub fn is_empty(&self) -> bool {
        self.name_suffixes.is_empty() && self.globs.is_empty()
    }

    pub fn matches(&self, path: &Path) -> bool {
        if !self.name_suffixes.is_empty() {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            if !self.name_suffixes.iter().any(|s| stem.ends_with(s.as_str())) {
                return false;
            }
        }

        if !self.globs.is_empty() {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.globs {
                match Glob::new(pattern) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => log::warn!("invalid file glob '{}': {}", pattern, e),
                }
            }
            return match builder.build() {
                Ok(set) => set.is_match(path),
                Err(e) => {
                    log::warn!("cannot build file globs: {}", e);
                    false
                }
            };
        }

        true
    }
}

/// Value substituted for a `{n}` placeholder in a message template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageArg {
    /// Declared name of the node (or its member name)
    Name,
    /// Token text
    Text,
    MemberName,
    /// Name of the enclosing class, struct or interface
    ContainingType,
    SymbolName,
    /// Semantic type name, falling back to the declared type
    TypeName,
    /// Rule option value
    Option { key: String, default: String },
}

impl MessageArg {
    pub fn resolve(&self, node: &Cursor<'_>, ctx: &EvalContext<'_>) -> String {
        let value = match self {
            MessageArg::Name => node.name().or_else(|| node.member_name()),
            MessageArg::Text => node.text(),
            MessageArg::MemberName => node.member_name(),
            MessageArg::ContainingType => node
                .nearest_ancestor(&[
                    NodeKind::ClassDecl,
                    NodeKind::StructDecl,
                    NodeKind::InterfaceDecl,
                ])
                .and_then(|t| t.name()),
            MessageArg::SymbolName => ctx.symbols.symbol(node).map(|s| s.name.as_str()),
            MessageArg::TypeName => ctx
                .symbols
                .type_of(node)
                .map(|t| t.name.as_str())
                .or_else(|| node.declared_type()),
            MessageArg::Option { key, default } => {
                return ctx.option(key).unwrap_or(default).to_string()
            }
        };
        value.unwrap_or("").to_string()
    }
}

/// Node a finding is reported at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAt {
    /// The trigger node itself
    #[default]
    Node,
    /// The identifier carrying the trigger's name
    Name,
    /// The callee member access of an invocation
    Callee,
}

/// Outcome of evaluating one rule on one node
#[derive(Debug, Clone)]
pub struct MatchResult<'t> {
    pub matched: bool,
    /// Node to report at when matched
    pub location: Option<Cursor<'t>>,
    pub format_args: Vec<String>,
}

impl<'t> MatchResult<'t> {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            location: None,
            format_args: Vec::new(),
        }
    }
}

/// A lint rule definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier (e.g., "BlockingCall")
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Default severity level
    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub category: RuleCategory,

    #[serde(default)]
    pub stability: RuleStability,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Node kinds this rule is dispatched on
    pub triggers: Vec<NodeKind>,

    #[serde(default)]
    pub files: FileFilter,

    /// Gate evaluated before the predicate
    #[serde(default)]
    pub applies_when: Predicate,

    #[serde(default)]
    pub predicate: Predicate,

    /// Allowed contexts; any match suppresses the finding
    #[serde(default)]
    pub exceptions: Vec<Predicate>,

    /// Message template with `{0}`, `{1}` placeholders
    pub message: String,

    #[serde(default)]
    pub args: Vec<MessageArg>,

    #[serde(default)]
    pub report_at: ReportAt,

    #[serde(default)]
    pub fix: Option<FixProvider>,

    /// Whether this rule is enabled by default
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Documentation URL
    #[serde(default)]
    pub docs: Option<String>,

    #[serde(default)]
    pub rationale: Option<String>,

    #[serde(default)]
    pub example_bad: Option<String>,

    #[serde(default)]
    pub example_good: Option<String>,

    /// Replacement rule ID when deprecated
    #[serde(default)]
    pub replacement: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Create a new rule with minimal required fields
    pub fn new(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            description: None,
            severity: Severity::Warning,
            category: RuleCategory::default(),
            stability: RuleStability::default(),
            tags: Vec::new(),
            triggers: Vec::new(),
            files: FileFilter::default(),
            applies_when: Predicate::Always,
            predicate: Predicate::Always,
            exceptions: Vec::new(),
            message: message.to_string(),
            args: Vec::new(),
            report_at: ReportAt::Node,
            fix: None,
            enabled: true,
            docs: None,
            rationale: None,
            example_bad: None,
            example_good: None,
            replacement: None,
        }
    }

    /// Evaluate `applies_when ∧ predicate ∧ ¬(any exception)` at a node
    ///
    /// A panic inside a predicate is contained here and counts as no match.
    pub fn evaluate<'t>(&self, node: &Cursor<'t>, ctx: &EvalContext<'_>) -> MatchResult<'t> {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.applies_when.eval(node, ctx)
                && self.predicate.eval(node, ctx)
                && !self.exceptions.iter().any(|e| e.eval(node, ctx))
        }));

        match outcome {
            Ok(true) => {}
            Ok(false) => return MatchResult::no_match(),
            Err(_) => {
                log::warn!(
                    "rule {} failed on {} at {} in {}; treated as no match",
                    self.id,
                    node.kind(),
                    node.span(),
                    ctx.file.display()
                );
                return MatchResult::no_match();
            }
        }

        let format_args = self.args.iter().map(|a| a.resolve(node, ctx)).collect();
        MatchResult {
            matched: true,
            location: Some(self.report_location(node)),
            format_args,
        }
    }

    fn report_location<'t>(&self, node: &Cursor<'t>) -> Cursor<'t> {
        match self.report_at {
            ReportAt::Node => *node,
            ReportAt::Name => node.name_identifier().unwrap_or(*node),
            ReportAt::Callee => match node.kind() {
                NodeKind::Invocation => node
                    .callee()
                    .filter(|c| c.is(&NodeKind::MemberAccess))
                    .unwrap_or(*node),
                _ => *node,
            },
        }
    }

    /// Whether the rule runs on this file at all
    pub fn applies_to_file(&self, path: &Path) -> bool {
        self.files.matches(path)
    }

    /// Options this rule reads as numeric lists
    pub fn numeric_options(&self) -> Vec<&str> {
        let mut options: Vec<&str> = [&self.applies_when, &self.predicate]
            .into_iter()
            .chain(&self.exceptions)
            .flat_map(Predicate::numeric_options)
            .collect();
        if let Some(FixProvider {
            action: FixAction::SnapToAllowed { option, .. },
            ..
        }) = &self.fix
        {
            options.push(option);
        }
        options.sort_unstable();
        options.dedup();
        options
    }

    pub fn triggers_on(&self, kind: &NodeKind) -> bool {
        self.triggers.contains(kind)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    /// Mark rule as preview/experimental
    pub fn preview(mut self) -> Self {
        self.stability = RuleStability::Preview;
        self
    }

    /// Mark rule as deprecated in favour of another rule
    pub fn deprecated(mut self, replacement: Option<&str>) -> Self {
        self.stability = RuleStability::Deprecated;
        self.replacement = replacement.map(String::from);
        self
    }

    pub fn is_preview(&self) -> bool {
        self.stability == RuleStability::Preview
    }

    pub fn is_deprecated(&self) -> bool {
        self.stability == RuleStability::Deprecated
    }

    /// Get the deprecation warning message
    pub fn deprecation_warning(&self) -> Option<String> {
        if !self.is_deprecated() {
            return None;
        }
        let mut msg = format!("Rule '{}' is deprecated", self.id);
        if let Some(replacement) = &self.replacement {
            msg.push_str(&format!(". Use '{}' instead", replacement));
        }
        Some(msg)
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn has_any_tag(&self, tags: &HashSet<String>) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }

    pub fn on(mut self, kinds: &[NodeKind]) -> Self {
        self.triggers.extend_from_slice(kinds);
        self
    }

    pub fn only_files_ending_with(mut self, suffix: &str) -> Self {
        self.files.name_suffixes.push(suffix.to_string());
        self
    }

    pub fn only_files_matching(mut self, glob: &str) -> Self {
        self.files.globs.push(glob.to_string());
        self
    }

    pub fn applies_when(mut self, predicate: Predicate) -> Self {
        self.applies_when = predicate;
        self
    }

    pub fn matching(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn except(mut self, exception: Predicate) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn with_args(mut self, args: Vec<MessageArg>) -> Self {
        self.args = args;
        self
    }

    pub fn report_at(mut self, at: ReportAt) -> Self {
        self.report_at = at;
        self
    }

    pub fn with_fix(mut self, fix: FixProvider) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn with_docs(mut self, url: &str) -> Self {
        self.docs = Some(url.to_string());
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = Some(rationale.to_string());
        self
    }

    pub fn with_example_bad(mut self, example: &str) -> Self {
        self.example_bad = Some(example.to_string());
        self
    }

    pub fn with_example_good(mut self, example: &str) -> Self {
        self.example_good = Some(example.to_string());
        self
    }
}

/// Substitute `{0}`, `{1}` ... in a template; unknown indices stay verbatim
pub fn format_message(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let value = args.get(index)?;
            Some((value, close))
        });
        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Error loading a rule file
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown rule file format: {0}")]
    UnknownFormat(PathBuf),

    #[error("Rule '{0}' has no trigger kinds")]
    NoTriggers(String),
}

/// Rule file format (for loading from YAML/JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub version: Option<String>,

    pub rules: Vec<Rule>,
}

impl RuleFile {
    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file: RuleFile = match ext {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|source| RuleLoadError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            "json" => serde_json::from_str(&content).map_err(|source| RuleLoadError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(RuleLoadError::UnknownFormat(path.to_path_buf())),
        };

        if let Some(rule) = file.rules.iter().find(|r| r.triggers.is_empty()) {
            return Err(RuleLoadError::NoTriggers(rule.id.clone()));
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RuleOptions;
    use crate::semantic::SemanticModel;
    use crate::syntax::{NodeBuilder, SyntaxTree};

    fn class_tree(name: &str) -> SyntaxTree {
        let root = NodeBuilder::new(NodeKind::ClassDecl)
            .child(NodeBuilder::ident(name))
            .child(
                NodeBuilder::new(NodeKind::PropertyDecl)
                    .child(NodeBuilder::type_ref("ICommand"))
                    .child(NodeBuilder::ident("Save")),
            )
            .build();
        SyntaxTree::new(format!("{}.cs", name), root).unwrap()
    }

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new("test-rule", "Missing Id attribute");

        assert_eq!(rule.id, "test-rule");
        assert_eq!(rule.message, "Missing Id attribute");
        assert_eq!(rule.severity, Severity::Warning);
        assert!(rule.enabled);
        assert!(rule.triggers.is_empty());
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new("test", "message")
            .with_severity(Severity::Error)
            .on(&[NodeKind::PropertyDecl])
            .with_tag("mvvm")
            .with_docs("https://example.com");

        assert_eq!(rule.severity, Severity::Error);
        assert!(rule.triggers_on(&NodeKind::PropertyDecl));
        assert!(rule.has_tag("mvvm"));
        assert_eq!(rule.docs, Some("https://example.com".to_string()));

        let mut tags = HashSet::new();
        tags.insert("other".to_string());
        assert!(!rule.has_any_tag(&tags));
    }

    #[test]
    fn test_evaluate_with_exception_and_args() {
        let rule = Rule::new("NoCommandProperty", "Property '{0}' in {1} exposes a command")
            .on(&[NodeKind::PropertyDecl])
            .matching(Predicate::DeclaredTypeIn {
                names: vec!["ICommand".to_string()],
            })
            .except(crate::predicate::within_class_suffix(&["Repository"]))
            .with_args(vec![MessageArg::Name, MessageArg::ContainingType])
            .report_at(ReportAt::Name);

        let symbols = SemanticModel::empty();
        let options = RuleOptions::new();

        let tree = class_tree("FooViewModel");
        let ctx = EvalContext::new(&symbols, &options, &rule.id, tree.path());
        let prop = tree.nodes_of_kind(&NodeKind::PropertyDecl).next().unwrap();
        let result = rule.evaluate(&prop, &ctx);
        assert!(result.matched);
        assert_eq!(result.location.unwrap().text(), Some("Save"));
        assert_eq!(result.format_args, vec!["Save", "FooViewModel"]);
        assert_eq!(
            format_message(&rule.message, &result.format_args),
            "Property 'Save' in FooViewModel exposes a command"
        );

        let tree = class_tree("FooRepository");
        let ctx = EvalContext::new(&symbols, &options, &rule.id, tree.path());
        let prop = tree.nodes_of_kind(&NodeKind::PropertyDecl).next().unwrap();
        assert!(!rule.evaluate(&prop, &ctx).matched);
    }

    #[test]
    fn test_panicking_predicate_is_no_match() {
        let rule = Rule::new("Boom", "never")
            .on(&[NodeKind::ClassDecl])
            .matching(Predicate::custom("boom", |_, _| panic!("predicate bug")));
        let tree = class_tree("Foo");
        let symbols = SemanticModel::empty();
        let options = RuleOptions::new();
        let ctx = EvalContext::new(&symbols, &options, &rule.id, tree.path());
        assert!(!rule.evaluate(&tree.root_cursor(), &ctx).matched);
    }

    #[test]
    fn test_file_filter() {
        let filter = FileFilter {
            name_suffixes: vec!["Service".to_string()],
            globs: Vec::new(),
        };
        assert!(filter.matches(Path::new("src/OrderService.cs")));
        assert!(!filter.matches(Path::new("src/OrderServiceTests.cs")));

        let filter = FileFilter {
            name_suffixes: Vec::new(),
            globs: vec!["**/ViewModels/*.cs".to_string()],
        };
        assert!(filter.matches(Path::new("app/ViewModels/Main.cs")));
        assert!(!filter.matches(Path::new("app/Models/Main.cs")));
        assert!(FileFilter::default().matches(Path::new("anything.cs")));
    }

    #[test]
    fn test_format_message() {
        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(format_message("{1}-{0}", &args), "b-a");
        assert_eq!(format_message("{2} {x} {", &args), "{2} {x} {");
        assert_eq!(format_message("no args", &[]), "no args");
    }

    #[test]
    fn test_rule_file_deserialize() {
        let yaml = r#"
version: "1.0"
rules:
  - id: NoGodClass
    severity: error
    category: pedantic
    triggers: [class_decl]
    predicate: { type: name_ends_with, suffixes: [Manager] }
    exceptions:
      - { type: has_attribute, names: [Generated] }
    message: "Class '{0}' is a manager"
    args: [{ type: name }]
    report_at: name
    fix:
      title: "Rename to Coordinator"
      equivalence_key: NoGodClass.rename
      action: { type: rename_with_suffix, suffix: Coordinator }
"#;

        let file: RuleFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.version, Some("1.0".to_string()));
        assert_eq!(file.rules.len(), 1);
        let rule = &file.rules[0];
        assert_eq!(rule.id, "NoGodClass");
        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.category, RuleCategory::Pedantic);
        assert_eq!(rule.triggers, vec![NodeKind::ClassDecl]);
        assert_eq!(rule.report_at, ReportAt::Name);
        assert!(rule.fix.is_some());
    }

    #[test]
    fn test_rule_file_load_requires_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules:\n  - id: Empty\n    triggers: []\n    message: m\n").unwrap();
        assert!(matches!(
            RuleFile::load(&path),
            Err(RuleLoadError::NoTriggers(id)) if id == "Empty"
        ));

        let other = dir.path().join("rules.toml");
        std::fs::write(&other, "").unwrap();
        assert!(matches!(
            RuleFile::load(&other),
            Err(RuleLoadError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_deprecation_warning() {
        let rule = Rule::new("Old", "m").deprecated(Some("New"));
        assert!(rule.is_deprecated());
        assert_eq!(
            rule.deprecation_warning(),
            Some("Rule 'Old' is deprecated. Use 'New' instead".to_string())
        );
        assert!(Rule::new("Fresh", "m").deprecation_warning().is_none());
    }
}
