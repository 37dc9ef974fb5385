//! One analysis pass over one compilation unit

use crate::config::Config;
use crate::diagnostic::{Finding, Severity};
use crate::options::{RuleOptions, SeverityOverride};
use crate::registry::{DispatchContext, RuleRegistry};
use crate::rule::Rule;
use crate::semantic::SymbolContext;
use crate::syntax::{HostTree, NodeId, SyntaxTree};
use globset::GlobMatcher;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Session-fatal failure; other sessions are unaffected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("analysis of {} aborted: {reason}", file.display())]
    Aborted { file: PathBuf, reason: String },
}

impl SessionError {
    pub fn file(&self) -> &Path {
        match self {
            SessionError::Aborted { file, .. } => file,
        }
    }
}

/// Cooperative cancellation, checked before each node is dispatched
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    pub rule_id: String,
    /// Total time spent on this rule
    pub total_time: Duration,
    /// Number of times the rule was evaluated
    pub evaluation_count: usize,
    pub match_count: usize,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }

    pub fn merge(&mut self, other: &RuleTiming) {
        self.total_time += other.total_time;
        self.evaluation_count += other.evaluation_count;
        self.match_count += other.match_count;
    }
}

/// Result of one session
///
/// When the session was cancelled, `findings` holds what was found before
/// the signal, still deduplicated and sorted, and `cancelled` is set.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub file: PathBuf,
    pub findings: Vec<Finding>,
    pub nodes_visited: usize,
    pub cancelled: bool,
    /// Per-rule timing statistics (rule_id -> timing)
    pub rule_timings: HashMap<String, RuleTiming>,
    pub duration: Duration,
}

impl SessionReport {
    pub fn error_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_warning()).count()
    }

    pub fn findings_for<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.rule_id == rule_id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotStat {
    total: Duration,
    evaluations: usize,
    matches: usize,
}

/// Accumulated state of a walk over some of a tree's nodes
struct Walk {
    findings: Vec<Finding>,
    stats: Vec<SlotStat>,
    visited: usize,
    cancelled: bool,
}

impl Walk {
    fn new(slots: usize) -> Self {
        Self {
            findings: Vec::new(),
            stats: vec![SlotStat::default(); slots],
            visited: 0,
            cancelled: false,
        }
    }

    fn visit(
        &mut self,
        registry: &RuleRegistry,
        tree: &SyntaxTree,
        id: NodeId,
        ctx: &DispatchContext<'_>,
        severities: &[Option<Severity>],
    ) {
        let Some(node) = tree.cursor(id) else { return };
        self.visited += 1;
        let stats = &mut self.stats;
        let found = registry.dispatch_selected(&node, ctx, severities, &mut |slot, elapsed, matched| {
            if let Some(stat) = stats.get_mut(slot) {
                stat.total += elapsed;
                stat.evaluations += 1;
                stat.matches += usize::from(matched);
            }
        });
        self.findings.extend(found);
    }

    fn merge(mut self, other: Walk) -> Walk {
        self.findings.extend(other.findings);
        for (mine, theirs) in self.stats.iter_mut().zip(other.stats) {
            mine.total += theirs.total;
            mine.evaluations += theirs.evaluations;
            mine.matches += theirs.matches;
        }
        self.visited += other.visited;
        self.cancelled |= other.cancelled;
        self
    }
}

/// Warn once per session about numeric options that will be partly or
/// wholly ignored
fn report_numeric_options(registry: &RuleRegistry, options: &RuleOptions) {
    for rule in registry.rules() {
        for option in rule.numeric_options() {
            options.report_numbers(&rule.id, option);
        }
    }
}

/// Drives rule dispatch over one tree
pub struct AnalysisSession {
    registry: Arc<RuleRegistry>,
    config: Config,
    options: RuleOptions,
    per_file: Vec<(GlobMatcher, Vec<String>)>,
    parallel_dispatch: bool,
    cancellation: Option<CancellationToken>,
}

impl AnalysisSession {
    pub fn new(registry: Arc<RuleRegistry>, config: &Config) -> Self {
        let options = config.rule_options();
        report_numeric_options(&registry, &options);
        Self {
            registry,
            options,
            per_file: config.per_file_matchers(),
            parallel_dispatch: config.engine.parallel_dispatch,
            config: config.clone(),
            cancellation: None,
        }
    }

    /// Dispatch the nodes of one tree across the rayon pool
    pub fn with_parallel_dispatch(mut self, parallel: bool) -> Self {
        self.parallel_dispatch = parallel;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Replace the flat options resolved from the configuration
    pub fn with_options(mut self, options: RuleOptions) -> Self {
        report_numeric_options(&self.registry, &options);
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Effective severity of a rule for a file; `None` when it does not run
    ///
    /// Flat options win over the configuration's severity map, which wins
    /// over the rule's default.
    pub fn effective_severity(&self, rule: &Rule, file: &Path) -> Option<Severity> {
        if !self.config.is_rule_active(rule) || !rule.applies_to_file(file) {
            return None;
        }
        let ignored = self.per_file.iter().any(|(matcher, rules)| {
            matcher.is_match(file) && rules.iter().any(|r| r == "all" || *r == rule.id)
        });
        if ignored {
            return None;
        }

        match self.options.severity(&rule.id) {
            Some(SeverityOverride::Disabled) => None,
            Some(SeverityOverride::Level(severity)) => Some(severity),
            None => Some(
                self.config
                    .get_severity_override(&rule.id)
                    .unwrap_or(rule.severity),
            ),
        }
    }

    /// Validate host data and build the tree a session runs on
    pub fn prepare(path: &Path, host: &HostTree) -> Result<SyntaxTree, SessionError> {
        host.build(path).map_err(|e| SessionError::Aborted {
            file: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Analyse a tree supplied in the host's flat format
    pub fn run_host(
        &self,
        path: &Path,
        host: &HostTree,
        symbols: &dyn SymbolContext,
    ) -> Result<SessionReport, SessionError> {
        let tree = Self::prepare(path, host)?;
        self.run(&tree, symbols)
    }

    /// Analyse one tree
    pub fn run(
        &self,
        tree: &SyntaxTree,
        symbols: &dyn SymbolContext,
    ) -> Result<SessionReport, SessionError> {
        let start = Instant::now();
        let file = tree.path();
        if tree.is_empty() {
            return Err(SessionError::Aborted {
                file: file.to_path_buf(),
                reason: "tree has no nodes".to_string(),
            });
        }

        let registry = &*self.registry;
        let severities: Vec<Option<Severity>> = registry
            .rules()
            .iter()
            .map(|rule| self.effective_severity(rule, file))
            .collect();
        let ctx = DispatchContext {
            symbols,
            options: &self.options,
            file,
        };

        let walk = if self.parallel_dispatch {
            let ids: Vec<NodeId> = tree.ids().collect();
            ids.par_iter()
                .fold(
                    || Walk::new(registry.len()),
                    |mut walk, &id| {
                        if self.is_cancelled() {
                            walk.cancelled = true;
                        } else {
                            walk.visit(registry, tree, id, &ctx, &severities);
                        }
                        walk
                    },
                )
                .reduce(|| Walk::new(registry.len()), Walk::merge)
        } else {
            let mut walk = Walk::new(registry.len());
            for id in tree.ids() {
                if self.is_cancelled() {
                    walk.cancelled = true;
                    break;
                }
                walk.visit(registry, tree, id, &ctx, &severities);
            }
            walk
        };

        let mut findings = walk.findings;
        findings.sort_by(|a, b| Finding::report_order(a, b).then(a.trigger.id.cmp(&b.trigger.id)));
        findings.dedup_by(|later, earlier| later.key() == earlier.key());

        let mut rule_timings = HashMap::new();
        for (slot, stat) in walk.stats.iter().enumerate() {
            if stat.evaluations == 0 {
                continue;
            }
            let rule = &registry.rules()[slot];
            rule_timings.insert(
                rule.id.clone(),
                RuleTiming {
                    rule_id: rule.id.clone(),
                    total_time: stat.total,
                    evaluation_count: stat.evaluations,
                    match_count: stat.matches,
                },
            );
        }

        if walk.cancelled {
            log::debug!(
                "{}: cancelled after {} of {} nodes",
                file.display(),
                walk.visited,
                tree.len()
            );
        }

        Ok(SessionReport {
            file: file.to_path_buf(),
            findings,
            nodes_visited: walk.visited,
            cancelled: walk.cancelled,
            rule_timings,
            duration: start.elapsed(),
        })
    }
}
