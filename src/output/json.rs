//! JSON output formatter

use super::OutputFormatter;
use crate::diagnostic::Finding;
use crate::engine::AnalysisResult;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| {
            log::error!("cannot serialize JSON output: {}", e);
            String::new()
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    findings: Vec<JsonFinding<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    aborted: Vec<JsonAborted>,
    summary: JsonSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonFinding<'a> {
    rule_id: &'a str,
    severity: String,
    file: String,
    line: usize,
    column: usize,
    length: usize,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<JsonFix<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonFix<'a> {
    title: &'a str,
    equivalence_key: &'a str,
    safety: String,
}

#[derive(Serialize)]
struct JsonAborted {
    file: String,
    reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSummary {
    units_processed: usize,
    units_aborted: usize,
    error_count: usize,
    warning_count: usize,
    info_count: usize,
    cancelled: bool,
    duration_ms: u128,
}

impl<'a> From<&'a Finding> for JsonFinding<'a> {
    fn from(f: &'a Finding) -> Self {
        JsonFinding {
            rule_id: &f.rule_id,
            severity: f.severity.to_string(),
            file: f.file().display().to_string(),
            line: f.location.line,
            column: f.location.column,
            length: f.location.length,
            message: &f.message,
            help: f.help.as_deref(),
            fix: f.fix.as_ref().map(|fix| JsonFix {
                title: &fix.title,
                equivalence_key: &fix.equivalence_key,
                safety: fix.safety.to_string(),
            }),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, result: &AnalysisResult) -> String {
        let output = JsonOutput {
            findings: result.findings.iter().map(JsonFinding::from).collect(),
            aborted: result
                .aborted
                .iter()
                .map(|e| JsonAborted {
                    file: e.file().display().to_string(),
                    reason: e.to_string(),
                })
                .collect(),
            summary: JsonSummary {
                units_processed: result.units_processed,
                units_aborted: result.aborted.len(),
                error_count: result.error_count,
                warning_count: result.warning_count,
                info_count: result.info_count,
                cancelled: result.was_cancelled(),
                duration_ms: result.duration.as_millis(),
            },
        };
        self.render(&output)
    }

    fn format_finding(&self, finding: &Finding) -> String {
        self.render(&JsonFinding::from(finding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::syntax::{NodeBuilder, SyntaxTree};
    use std::path::Path;

    fn finding() -> Finding {
        let tree = SyntaxTree::new("Foo.cs", NodeBuilder::ident("Result").build()).unwrap();
        let target = tree.root_cursor().node_ref();
        Finding::new(
            "BlockingCall",
            Severity::Error,
            "Blocking call",
            Path::new("Foo.cs"),
            target.clone(),
            target,
        )
    }

    #[test]
    fn test_json_format_finding() {
        let output = JsonFormatter::new().format_finding(&finding());
        assert!(output.contains("\"ruleId\":\"BlockingCall\""));
        assert!(output.contains("\"severity\":\"error\""));
        assert!(output.contains("\"file\":\"Foo.cs\""));
        assert!(output.contains("\"line\":1"));
        assert!(!output.contains("\"fix\""));
    }

    #[test]
    fn test_json_format_result() {
        let result = AnalysisResult {
            findings: vec![finding()],
            units_processed: 5,
            error_count: 1,
            ..Default::default()
        };

        let output = JsonFormatter::new().format(&result);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["summary"]["unitsProcessed"], 5);
        assert_eq!(value["summary"]["errorCount"], 1);
        assert_eq!(value["findings"][0]["message"], "Blocking call");
        assert!(value.get("aborted").is_none());
    }

    #[test]
    fn test_json_pretty() {
        let output = JsonFormatter::new().pretty().format_finding(&finding());
        assert!(output.contains('\n'));
    }
}
