//! Human-readable text output formatter

use super::OutputFormatter;
use crate::diagnostic::{Finding, FixSafety, Severity};
use crate::engine::AnalysisResult;
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show the kind and span of the reported node
    pub show_node: bool,

    /// Show help text
    pub show_help: bool,

    /// Show fix availability
    pub show_fixes: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_node: true,
            show_help: true,
            show_fixes: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn without_stats(mut self) -> Self {
        self.show_stats = false;
        self
    }

    fn severity_str(&self, severity: Severity) -> ColoredString {
        let s = format!("{}", severity);
        if !self.colored {
            return s.normal();
        }
        match severity {
            Severity::Error => s.red().bold(),
            Severity::Warning => s.yellow().bold(),
            Severity::Info => s.blue(),
        }
    }

    fn gutter(&self, mark: &str) -> String {
        if self.colored {
            mark.blue().to_string()
        } else {
            mark.to_string()
        }
    }

    fn count(&self, n: usize, singular: &str, plural: &str, color: Color) -> String {
        let s = format!("{} {}", n, if n == 1 { singular } else { plural });
        if self.colored {
            s.color(color).to_string()
        } else {
            s
        }
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, result: &AnalysisResult) -> String {
        let mut output = String::new();

        // findings arrive sorted by file, so grouping keeps report order
        let mut current_file = None;
        for finding in &result.findings {
            if current_file != Some(finding.file()) {
                if current_file.is_some() {
                    output.push('\n');
                }
                let header = finding.file().display().to_string();
                if self.colored {
                    output.push_str(&format!("{}\n", header.underline()));
                } else {
                    output.push_str(&format!("{}\n", header));
                }
                current_file = Some(finding.file());
            }
            output.push_str(&self.format_finding(finding));
        }

        if !result.aborted.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            for err in &result.aborted {
                let label = if self.colored {
                    "aborted".red().bold().to_string()
                } else {
                    "aborted".to_string()
                };
                output.push_str(&format!("{}: {}\n", label, err));
            }
        }

        if self.show_stats {
            output.push_str(&format!(
                "\n{} {} processed",
                result.units_processed,
                if result.units_processed == 1 {
                    "unit"
                } else {
                    "units"
                }
            ));

            let mut counts = Vec::new();
            if result.error_count > 0 {
                counts.push(self.count(result.error_count, "error", "errors", Color::Red));
            }
            if result.warning_count > 0 {
                counts.push(self.count(result.warning_count, "warning", "warnings", Color::Yellow));
            }
            if result.info_count > 0 {
                counts.push(self.count(result.info_count, "info", "infos", Color::Blue));
            }
            if !result.aborted.is_empty() {
                counts.push(self.count(result.aborted.len(), "aborted", "aborted", Color::Red));
            }
            if !counts.is_empty() {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            let fixable = result.findings.iter().filter(|f| f.has_safe_fix()).count();
            if fixable > 0 {
                output.push_str(&format!(
                    "{} fixable with `--fix`\n",
                    self.count(fixable, "finding", "findings", Color::Green)
                ));
            }
            if result.was_cancelled() {
                output.push_str("Analysis was cancelled; results are partial\n");
            }

            output.push_str(&format!(
                "Finished in {:.2}s\n",
                result.duration.as_secs_f64()
            ));
        }

        output
    }

    fn format_finding(&self, finding: &Finding) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}:{}:{}: {}[{}]: {}\n",
            finding.file().display(),
            finding.location.line,
            finding.location.column,
            self.severity_str(finding.severity),
            if self.colored {
                finding.rule_id.cyan().to_string()
            } else {
                finding.rule_id.clone()
            },
            finding.message
        ));

        if self.show_node {
            output.push_str(&format!(
                "   {} {} at {}..{}\n",
                self.gutter("|"),
                finding.target.kind,
                finding.span.start,
                finding.span.end
            ));
        }

        if self.show_help {
            if let Some(help) = &finding.help {
                output.push_str(&format!("   {} help: {}\n", self.gutter("="), help));
            }
        }

        if self.show_fixes {
            if let Some(fix) = &finding.fix {
                let mark = if self.colored {
                    "=".green().to_string()
                } else {
                    "=".to_string()
                };
                let note = match fix.safety {
                    FixSafety::Safe => String::new(),
                    other => format!(" ({})", other),
                };
                output.push_str(&format!("   {} fix: {}{}\n", mark, fix.title, note));
            }
        }

        output
    }
}
