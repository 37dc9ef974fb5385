//! Output formatters for analysis results

mod json;
mod sarif;
mod text;

pub use json::JsonFormatter;
pub use sarif::SarifFormatter;
pub use text::TextFormatter;

use crate::config::OutputFormat;
use crate::diagnostic::Finding;
use crate::engine::AnalysisResult;

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    /// Format the complete analysis result
    fn format(&self, result: &AnalysisResult) -> String;

    /// Format a single finding
    fn format_finding(&self, finding: &Finding) -> String;
}

/// Build the formatter for a configured output format
pub fn formatter_for(format: OutputFormat, colored: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new();
            Box::new(if colored {
                formatter
            } else {
                formatter.without_color()
            })
        }
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
        OutputFormat::Sarif => Box::new(SarifFormatter::new(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )),
    }
}
