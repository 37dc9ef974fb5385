//! SARIF (Static Analysis Results Interchange Format) output formatter
//!
//! SARIF is a standard format for static analysis tools, supported by
//! GitHub Actions, Azure DevOps, and other CI/CD systems.

use super::OutputFormatter;
use crate::diagnostic::{Finding, Severity};
use crate::engine::AnalysisResult;
use serde::Serialize;
use std::collections::BTreeMap;

const SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";

/// SARIF formatter for CI/CD integration
#[derive(Default)]
pub struct SarifFormatter {
    /// Tool name
    pub tool_name: String,

    /// Tool version
    pub tool_version: String,
}

impl SarifFormatter {
    /// Create a new SARIF formatter
    pub fn new(tool_name: &str, tool_version: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            tool_version: tool_version.to_string(),
        }
    }
}

#[derive(Serialize)]
struct SarifReport {
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    runs: Vec<SarifRun>,
}

#[derive(Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
    invocations: Vec<SarifInvocation>,
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize)]
struct SarifDriver {
    name: String,
    version: String,
    rules: Vec<SarifRule>,
}

#[derive(Serialize)]
struct SarifRule {
    id: String,
    #[serde(rename = "shortDescription")]
    short_description: SarifMessage,
    #[serde(rename = "defaultConfiguration")]
    default_configuration: SarifConfiguration,
}

#[derive(Serialize)]
struct SarifConfiguration {
    level: &'static str,
}

#[derive(Serialize)]
struct SarifResult {
    #[serde(rename = "ruleId")]
    rule_id: String,
    level: &'static str,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
}

#[derive(Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    physical_location: SarifPhysicalLocation,
}

#[derive(Serialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<SarifRegion>,
}

#[derive(Serialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Serialize)]
struct SarifRegion {
    #[serde(rename = "startLine")]
    start_line: usize,
    #[serde(rename = "startColumn")]
    start_column: usize,
    #[serde(rename = "endColumn", skip_serializing_if = "Option::is_none")]
    end_column: Option<usize>,
}

#[derive(Serialize)]
struct SarifInvocation {
    #[serde(rename = "executionSuccessful")]
    execution_successful: bool,
    #[serde(
        rename = "toolExecutionNotifications",
        skip_serializing_if = "Vec::is_empty"
    )]
    notifications: Vec<SarifNotification>,
}

#[derive(Serialize)]
struct SarifNotification {
    level: &'static str,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
}

fn severity_to_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "note",
    }
}

fn artifact(uri: String) -> SarifArtifactLocation {
    SarifArtifactLocation {
        uri: uri.replace('\\', "/"),
    }
}

fn result_for(finding: &Finding) -> SarifResult {
    SarifResult {
        rule_id: finding.rule_id.clone(),
        level: severity_to_level(finding.severity),
        message: SarifMessage {
            text: finding.message.clone(),
        },
        locations: vec![SarifLocation {
            physical_location: SarifPhysicalLocation {
                artifact_location: artifact(finding.file().display().to_string()),
                region: Some(SarifRegion {
                    start_line: finding.location.line,
                    start_column: finding.location.column,
                    end_column: (finding.location.length > 0)
                        .then(|| finding.location.column + finding.location.length),
                }),
            },
        }],
    }
}

impl OutputFormatter for SarifFormatter {
    fn format(&self, result: &AnalysisResult) -> String {
        let mut rules_map = BTreeMap::new();
        for finding in &result.findings {
            rules_map
                .entry(finding.rule_id.clone())
                .or_insert_with(|| SarifRule {
                    id: finding.rule_id.clone(),
                    short_description: SarifMessage {
                        text: finding.help.clone().unwrap_or_else(|| finding.message.clone()),
                    },
                    default_configuration: SarifConfiguration {
                        level: severity_to_level(finding.severity),
                    },
                });
        }

        let notifications = result
            .aborted
            .iter()
            .map(|err| SarifNotification {
                level: "error",
                message: SarifMessage {
                    text: err.to_string(),
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: artifact(err.file().display().to_string()),
                        region: None,
                    },
                }],
            })
            .collect();

        let report = SarifReport {
            schema: SCHEMA,
            version: "2.1.0",
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: self.tool_name.clone(),
                        version: self.tool_version.clone(),
                        rules: rules_map.into_values().collect(),
                    },
                },
                results: result.findings.iter().map(result_for).collect(),
                invocations: vec![SarifInvocation {
                    execution_successful: result.aborted.is_empty(),
                    notifications,
                }],
            }],
        };

        serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
            log::error!("cannot serialize SARIF report: {}", e);
            String::new()
        })
    }

    fn format_finding(&self, finding: &Finding) -> String {
        serde_json::to_string_pretty(&result_for(finding)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;
    use crate::syntax::{NodeBuilder, SyntaxTree};
    use std::path::{Path, PathBuf};

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
    fn test_sarif_format() {
        let formatter = SarifFormatter::new("thicket", "0.1.0");
        let result = AnalysisResult {
            findings: vec![finding()],
            units_processed: 1,
            error_count: 1,
            ..Default::default()
        };

        let output = formatter.format(&result);
        assert!(output.contains("sarif-schema-2.1.0.json"));
        assert!(output.contains("\"version\": \"2.1.0\""));
        assert!(output.contains("\"ruleId\": \"BlockingCall\""));
        assert!(output.contains("\"level\": \"error\""));
        assert!(output.contains("\"endColumn\": 7"));
        assert!(output.contains("\"executionSuccessful\": true"));
    }

    #[test]
    fn test_aborted_units_become_notifications() {
        let formatter = SarifFormatter::new("thicket", "0.1.0");
        let result = AnalysisResult {
            aborted: vec![SessionError::Aborted {
                file: PathBuf::from("Broken.cs"),
                reason: "cycle".to_string(),
            }],
            units_processed: 1,
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_str(&formatter.format(&result)).unwrap();
        let invocation = &value["runs"][0]["invocations"][0];
        assert_eq!(invocation["executionSuccessful"], false);
        assert_eq!(
            invocation["toolExecutionNotifications"][0]["locations"][0]["physicalLocation"]
                ["artifactLocation"]["uri"],
            "Broken.cs"
        );
    }

    #[test]
    fn test_sarif_severity_mapping() {
        assert_eq!(severity_to_level(Severity::Error), "error");
        assert_eq!(severity_to_level(Severity::Warning), "warning");
        assert_eq!(severity_to_level(Severity::Info), "note");
    }
}
