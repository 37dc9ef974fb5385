//! Multi-unit driver

use crate::config::Config;
use crate::diagnostic::{Finding, Severity};
use crate::fix::{CodeAction, FixBatch, FixEngine, FixScope};
use crate::registry::RegistryHandle;
use crate::session::{AnalysisSession, CancellationToken, RuleTiming, SessionError, SessionReport};
use crate::syntax::SyntaxTree;
use crate::unit::CompilationUnit;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Aggregated result over many compilation units
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// One report per unit that was analysed, in input order
    pub reports: Vec<SessionReport>,

    /// All findings, sorted by file then location
    pub findings: Vec<Finding>,

    /// Units whose session aborted
    pub aborted: Vec<SessionError>,

    /// Units processed (including aborted ones)
    pub units_processed: usize,

    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,

    /// Processing duration
    pub duration: Duration,

    /// Per-rule timing statistics (rule_id -> timing)
    pub rule_timings: HashMap<String, RuleTiming>,
}

impl AnalysisResult {
    fn add_report(&mut self, report: SessionReport) {
        for finding in &report.findings {
            match finding.severity {
                Severity::Error => self.error_count += 1,
                Severity::Warning => self.warning_count += 1,
                Severity::Info => self.info_count += 1,
            }
        }
        for (rule_id, timing) in &report.rule_timings {
            self.rule_timings
                .entry(rule_id.clone())
                .or_insert_with(|| RuleTiming::new(rule_id))
                .merge(timing);
        }
        self.findings.extend(report.findings.iter().cloned());
        self.reports.push(report);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// No findings and no aborted units
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.aborted.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.reports.iter().any(|r| r.cancelled)
    }

    /// Get exit code (0 = clean or warnings only, 1 = errors, 2 = aborted units)
    pub fn exit_code(&self) -> i32 {
        if !self.aborted.is_empty() {
            2
        } else if self.error_count > 0 {
            1
        } else {
            0
        }
    }

    /// Get rule timings sorted by total time (descending)
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.values().collect();
        timings.sort_by(|a, b| {
            b.total_time
                .cmp(&a.total_time)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        timings
    }

    /// Format timing statistics as a string
    pub fn format_timings(&self) -> String {
        let timings = self.sorted_timings();
        if timings.is_empty() {
            return "No timing data available".to_string();
        }

        let mut output = String::new();
        output.push_str("Rule Timing Statistics:\n");
        output.push_str(&format!(
            "{:<32} {:>12} {:>12} {:>10} {:>10}\n",
            "Rule ID", "Total", "Avg", "Evals", "Matches"
        ));
        output.push_str(&"-".repeat(80));
        output.push('\n');

        for timing in timings {
            let total_ms = timing.total_time.as_secs_f64() * 1000.0;
            let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
            output.push_str(&format!(
                "{:<32} {:>10.2}ms {:>10.2}µs {:>10} {:>10}\n",
                timing.rule_id, total_ms, avg_us, timing.evaluation_count, timing.match_count
            ));
        }
        output
    }
}

/// Fix outcome for one unit
#[derive(Debug)]
pub struct UnitFix {
    /// Tree as analysed
    pub before: SyntaxTree,
    pub report: SessionReport,
    pub batch: FixBatch,
}

/// Runs one session per unit on a worker pool
pub struct Analyzer {
    config: Config,
    registry: Arc<RegistryHandle>,
    cancellation: Option<CancellationToken>,
}

impl Analyzer {
    pub fn new(config: Config, registry: Arc<RegistryHandle>) -> Self {
        Self {
            config,
            registry,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn session(&self) -> AnalysisSession {
        let session = AnalysisSession::new(self.registry.snapshot(), &self.config);
        match &self.cancellation {
            Some(token) => session.with_cancellation(token.clone()),
            None => session,
        }
    }

    fn pool(&self) -> Option<rayon::ThreadPool> {
        let threads = if self.config.engine.jobs > 0 {
            self.config.engine.jobs
        } else {
            num_cpus::get()
        };
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("cannot start worker pool ({}), analysing sequentially", e);
                None
            }
        }
    }

    /// Analyse every unit; an aborted unit does not affect the others
    pub fn analyze(&self, units: &[CompilationUnit]) -> AnalysisResult {
        let start = Instant::now();
        // one registry snapshot for the whole run
        let session = self.session();
        let run = |unit: &CompilationUnit| session.run_host(&unit.path, &unit.tree, &unit.semantics);

        let pool = if self.config.engine.parallel {
            self.pool()
        } else {
            None
        };
        let outcomes: Vec<Result<SessionReport, SessionError>> = match pool {
            Some(pool) => pool.install(|| units.par_iter().map(run).collect()),
            None => units.iter().map(run).collect(),
        };

        let mut result = AnalysisResult {
            units_processed: units.len(),
            ..AnalysisResult::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(report) => result.add_report(report),
                Err(err) => {
                    log::warn!("{}", err);
                    result.aborted.push(err);
                }
            }
        }
        result.findings.sort_by(Finding::report_order);
        result.duration = start.elapsed();
        result
    }

    /// Load unit files and analyse them; unreadable files count as aborted
    pub fn analyze_files(&self, paths: &[PathBuf]) -> AnalysisResult {
        let mut units = Vec::with_capacity(paths.len());
        let mut failed = Vec::new();
        for path in paths {
            match CompilationUnit::load(path) {
                Ok(unit) => units.push(unit),
                Err(e) => failed.push(SessionError::Aborted {
                    file: path.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let mut result = self.analyze(&units);
        result.units_processed += failed.len();
        result.aborted.extend(failed);
        result
    }

    fn fix_engine(session: &AnalysisSession) -> FixEngine {
        FixEngine::new(Arc::clone(session.registry())).with_options(session.options().clone())
    }

    /// Fixes offered for one unit, without applying any of them
    pub fn code_actions(&self, unit: &CompilationUnit) -> Result<Vec<CodeAction>, SessionError> {
        let session = self.session();
        let tree = AnalysisSession::prepare(&unit.path, &unit.tree)?;
        let report = session.run(&tree, &unit.semantics)?;
        Ok(Self::fix_engine(&session).code_actions(&tree, &unit.semantics, &report.findings))
    }

    /// Analyse one unit and apply the fixes in `scope` as a single batch
    pub fn fix(&self, unit: &CompilationUnit, scope: &FixScope) -> Result<UnitFix, SessionError> {
        let session = self.session();
        let before = AnalysisSession::prepare(&unit.path, &unit.tree)?;
        let report = session.run(&before, &unit.semantics)?;

        let engine = Self::fix_engine(&session);
        let batch = engine.fix_all(&before, &unit.semantics, &report.findings, scope);
        log::debug!(
            "{}: {} fixes applied, {} rejected, {} dropped",
            unit.path.display(),
            batch.applied(),
            batch.rejected(),
            batch.dropped()
        );
        Ok(UnitFix {
            before,
            report,
            batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_registry;
    use crate::syntax::{FlatNode, HostTree, NodeKind, Span};

    fn unit(path: &str, nodes: Vec<FlatNode>) -> CompilationUnit {
        CompilationUnit {
            path: PathBuf::from(path),
            tree: HostTree {
                root: Some(0),
                nodes,
            },
            semantics: Default::default(),
        }
    }

    fn flat(id: usize, kind: NodeKind, start: usize, end: usize, text: Option<&str>, children: Vec<usize>) -> FlatNode {
        FlatNode {
            id,
            kind,
            span: Span::new(start, end, 1, start + 1),
            text: text.map(String::from),
            children,
        }
    }

    fn greeter(path: &str) -> CompilationUnit {
        unit(
            path,
            vec![
                flat(0, NodeKind::ClassDecl, 0, 60, None, vec![1, 2]),
                flat(1, NodeKind::Identifier, 6, 13, Some("Greeter"), vec![]),
                flat(2, NodeKind::MethodDecl, 16, 58, None, vec![3, 4, 5]),
                flat(3, NodeKind::TypeRef, 16, 22, Some("string"), vec![]),
                flat(4, NodeKind::Identifier, 23, 28, Some("Greet"), vec![]),
                flat(5, NodeKind::Block, 30, 58, None, vec![6]),
                flat(6, NodeKind::ReturnStatement, 32, 55, None, vec![7]),
                flat(7, NodeKind::StringLiteral, 39, 46, Some("Hello"), vec![]),
            ],
        )
    }

    fn analyzer(parallel: bool) -> Analyzer {
        let mut config = Config::default();
        config.engine.parallel = parallel;
        config.engine.jobs = 2;
        Analyzer::new(config, Arc::new(RegistryHandle::new(builtin_registry())))
    }

    #[test]
    fn test_aborted_unit_does_not_affect_others() {
        let broken = unit(
            "Broken.cs",
            vec![flat(0, NodeKind::Block, 0, 1, None, vec![9])],
        );
        let result = analyzer(true).analyze(&[greeter("b/Greeter.cs"), broken, greeter("a/Greeter.cs")]);

        assert_eq!(result.units_processed, 3);
        assert_eq!(result.aborted.len(), 1);
        assert_eq!(result.aborted[0].file(), std::path::Path::new("Broken.cs"));
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].file(), std::path::Path::new("a/Greeter.cs"));
        assert_eq!(result.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        let result = analyzer(false).analyze(&[greeter("Greeter.cs")]);
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.exit_code(), 0);

        let mut config = Config::default();
        config
            .rules
            .severity
            .insert("HardcodedString".to_string(), Severity::Error);
        let strict = Analyzer::new(config, Arc::new(RegistryHandle::new(builtin_registry())));
        assert_eq!(strict.analyze(&[greeter("Greeter.cs")]).exit_code(), 1);
    }

    #[test]
    fn test_fix_extracts_constant() {
        let outcome = analyzer(false)
            .fix(&greeter("Greeter.cs"), &FixScope::all(false))
            .unwrap();
        assert_eq!(outcome.batch.applied(), 1);
        let fields = outcome.batch.tree.nodes_of_kind(&NodeKind::FieldDecl).count();
        assert_eq!(fields, 1);
        assert_eq!(outcome.before.nodes_of_kind(&NodeKind::FieldDecl).count(), 0);
    }

    #[test]
    fn test_code_actions_leave_unit_untouched() {
        let unit = greeter("Greeter.cs");
        let actions = analyzer(false).code_actions(&unit).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].rule_id, "HardcodedString");
        assert_eq!(actions[0].location.line, 1);
        assert_eq!(unit.tree.nodes.len(), 8);
    }

    #[test]
    fn test_timings_are_aggregated() {
        let result = analyzer(false).analyze(&[greeter("A.cs"), greeter("B.cs")]);
        let timing = &result.rule_timings["HardcodedString"];
        assert_eq!(timing.evaluation_count, 2);
        assert_eq!(timing.match_count, 2);
        assert!(result.format_timings().contains("HardcodedString"));
    }
}
