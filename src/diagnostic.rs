//! Finding types produced by analysis sessions

use crate::syntax::{NodeRef, Span};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Severity level for findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,
    /// Warning - potential issue
    #[default]
    Warning,
    /// Error - definite problem
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" | "hint" | "note" | "suggestion" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Fix safety classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSafety {
    /// Preserves meaning, applied by a plain `--fix`
    #[default]
    Safe,
    /// May change behavior, applied only with `--unsafe-fixes`
    Unsafe,
    /// Offered as a code action, never applied in batch
    Display,
}

impl std::fmt::Display for FixSafety {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixSafety::Safe => write!(f, "safe"),
            FixSafety::Unsafe => write!(f, "unsafe"),
            FixSafety::Display => write!(f, "display"),
        }
    }
}

/// Source code location
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path
    pub file: PathBuf,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Length of the highlighted region
    pub length: usize,
}

impl Location {
    pub fn new(file: PathBuf, line: usize, column: usize) -> Self {
        Self {
            file,
            line,
            column,
            length: 0,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn from_span(file: &Path, span: Span) -> Self {
        Self::new(file.to_path_buf(), span.line, span.column).with_length(span.len())
    }
}

/// Summary of the fix a finding offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixHint {
    pub title: String,
    pub equivalence_key: String,
    pub safety: FixSafety,
}

/// A rule match reported by a session
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    /// Rule ID that produced this finding
    pub rule_id: String,
    pub severity: Severity,
    /// Message with template arguments substituted
    pub message: String,
    pub location: Location,
    /// Reported span (dedup key together with the rule id)
    pub span: Span,
    /// Node the rule was dispatched on
    #[serde(skip)]
    pub trigger: NodeRef,
    /// Node the finding is reported at (the fix target)
    #[serde(skip)]
    pub target: NodeRef,
    /// Template arguments, kept for fix providers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Help text (usually rule description)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixHint>,
}

impl Finding {
    pub fn new(
        rule_id: &str,
        severity: Severity,
        message: &str,
        file: &Path,
        trigger: NodeRef,
        target: NodeRef,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            message: message.to_string(),
            location: Location::from_span(file, target.span),
            span: target.span,
            trigger,
            target,
            args: Vec::new(),
            help: None,
            fix: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    pub fn with_fix(mut self, fix: FixHint) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn file(&self) -> &Path {
        &self.location.file
    }

    pub fn has_fix(&self) -> bool {
        self.fix.is_some()
    }

    pub fn has_safe_fix(&self) -> bool {
        self.fix.as_ref().is_some_and(|f| f.safety == FixSafety::Safe)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Identity used for deduplication
    pub fn key(&self) -> (&str, Span) {
        (&self.rule_id, self.span)
    }

    /// Canonical report order: file, span start, rule id
    pub fn report_order(a: &Finding, b: &Finding) -> Ordering {
        a.location
            .file
            .cmp(&b.location.file)
            .then(a.span.start.cmp(&b.span.start))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then(a.span.end.cmp(&b.span.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{NodeBuilder, NodeKind, SyntaxTree};

    fn node_ref() -> NodeRef {
        let tree = SyntaxTree::new("a.cs", NodeBuilder::ident("x").build()).unwrap();
        tree.root_cursor().node_ref()
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("Warning".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("suggestion".parse::<Severity>(), Ok(Severity::Info));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(format!("{}", Severity::Error), "error");
        assert_eq!(format!("{}", Severity::Warning), "warning");
        assert_eq!(format!("{}", Severity::Info), "info");
    }

    #[test]
    fn test_finding_location_follows_target() {
        let target = node_ref();
        let finding = Finding::new(
            "BlockingCall",
            Severity::Error,
            "Blocking call",
            Path::new("a.cs"),
            target.clone(),
            target,
        );
        assert_eq!(finding.location.line, 1);
        assert_eq!(finding.location.column, 1);
        assert_eq!(finding.location.length, 1);
        assert_eq!(finding.span.start, 0);
        assert!(finding.is_error());
        assert!(!finding.has_fix());
    }

    #[test]
    fn test_report_order() {
        let target = node_ref();
        let mk = |rule: &str, file: &str, start: usize| {
            let mut target = target.clone();
            target.span.start = start;
            target.kind = NodeKind::Identifier;
            Finding::new(rule, Severity::Warning, "m", Path::new(file), target.clone(), target)
        };
        let mut findings = vec![mk("B", "b.cs", 0), mk("B", "a.cs", 5), mk("A", "a.cs", 5)];
        findings.sort_by(Finding::report_order);
        let order: Vec<_> = findings
            .iter()
            .map(|f| (f.file().to_string_lossy().to_string(), f.rule_id.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.cs".to_string(), "A".to_string()),
                ("a.cs".to_string(), "B".to_string()),
                ("b.cs".to_string(), "B".to_string()),
            ]
        );
    }
}
