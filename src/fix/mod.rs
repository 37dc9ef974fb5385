//! Fix engine
//!
//! Fixes are computed per finding as an [`Edit`]: a list of operations on
//! nodes of one tree. Applying a batch never touches the input tree; it
//! produces a new tree that shares every subtree the batch did not change.
//!
//! Edits are taken in location order: by anchor start, and for anchors
//! that start at the same offset the one that ends later (the enclosing
//! node) first, then by rule id. Conflict policy, in that order:
//! - a replaced or removed node that overlaps (is an ancestor or a
//!   descendant of) a node already claimed by an accepted edit is rejected
//! - an insertion whose parent lies inside a claimed node is rejected
//! - an edit whose targets cannot be found in the tree is dropped
//!
//! Fixes are classified as safe or unsafe:
//! - Safe fixes preserve code meaning and can be applied automatically
//! - Unsafe fixes may change runtime behavior and require explicit opt-in

mod action;
mod apply;

pub use action::{constant_name, nearest_allowed, CustomFix, FixAction, FixContext, FixProvider};

use crate::diagnostic::{Finding, FixSafety, Location};
use crate::options::RuleOptions;
use crate::registry::RuleRegistry;
use crate::semantic::SymbolContext;
use crate::syntax::{Cursor, NodeKind, NodeRef, Span, SyntaxNode, SyntaxTree, TreeId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where an inserted child goes among its new siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    First,
    Last,
    /// Before the first child of this kind, or last when there is none
    Before(NodeKind),
    /// Among siblings of the same kind, ordered by name; otherwise before
    /// the first member declaration
    SortedByName,
}

#[derive(Debug, Clone)]
pub enum EditOp {
    Replace {
        target: NodeRef,
        replacement: Arc<SyntaxNode>,
    },
    Remove {
        target: NodeRef,
    },
    Insert {
        parent: NodeRef,
        child: Arc<SyntaxNode>,
        position: InsertPosition,
    },
}

impl EditOp {
    pub fn replace(target: &Cursor<'_>, replacement: Arc<SyntaxNode>) -> Self {
        EditOp::Replace {
            target: target.node_ref(),
            replacement,
        }
    }

    pub fn remove(target: &Cursor<'_>) -> Self {
        EditOp::Remove {
            target: target.node_ref(),
        }
    }

    pub fn insert(parent: &Cursor<'_>, child: Arc<SyntaxNode>, position: InsertPosition) -> Self {
        EditOp::Insert {
            parent: parent.node_ref(),
            child,
            position,
        }
    }
}

/// The computed fix for one finding
#[derive(Debug, Clone)]
pub struct Edit {
    /// Tree the edit was computed against
    pub tree: TreeId,
    pub file: PathBuf,
    pub rule_id: String,
    pub title: String,
    pub equivalence_key: String,
    pub safety: FixSafety,
    /// Span of the reported node; orders edits within a batch
    pub anchor: Span,
    pub ops: Vec<EditOp>,
}

impl Edit {
    /// True when the edit adds siblings, so ancestors beyond the target change
    pub fn requires_ancestor_rewrite(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, EditOp::Insert { .. }))
    }
}

/// Lifecycle of a fix: `Unfixed -> FixComputed -> Applied | Rejected | Dropped`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixStatus {
    /// No edit could be computed
    Unfixed,
    FixComputed,
    Applied,
    /// Conflicts with an edit accepted earlier in the batch
    Rejected { reason: String },
    /// Target no longer present in the tree
    Dropped { reason: String },
}

#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub rule_id: String,
    pub title: String,
    pub anchor: Span,
    pub status: FixStatus,
}

impl FixOutcome {
    fn computed(edit: &Edit) -> Self {
        Self {
            rule_id: edit.rule_id.clone(),
            title: edit.title.clone(),
            anchor: edit.anchor,
            status: FixStatus::FixComputed,
        }
    }
}

/// Result of applying a batch: the new tree and one outcome per edit
#[derive(Debug)]
pub struct FixBatch {
    pub tree: SyntaxTree,
    pub outcomes: Vec<FixOutcome>,
}

impl FixBatch {
    fn count(&self, f: impl Fn(&FixStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|s| *s == FixStatus::Applied)
    }

    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, FixStatus::Rejected { .. }))
    }

    pub fn dropped(&self) -> usize {
        self.count(|s| matches!(s, FixStatus::Dropped { .. }))
    }

    pub fn unfixed(&self) -> usize {
        self.count(|s| *s == FixStatus::Unfixed)
    }

    pub fn is_changed(&self) -> bool {
        self.applied() > 0
    }
}

/// A fix offered to the user for one finding
#[derive(Debug, Clone)]
pub struct CodeAction {
    pub title: String,
    pub equivalence_key: String,
    pub rule_id: String,
    pub location: Location,
    pub edit: Edit,
}

/// Fix mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixMode {
    /// Apply only safe fixes (default)
    #[default]
    SafeOnly,
    /// Apply all fixes including unsafe
    All,
    /// Show a diff of the changes without writing them
    Diff,
    /// List available fixes without applying
    ShowOnly,
}

/// Which findings a fix-all covers
#[derive(Debug, Clone, Default)]
pub struct FixScope {
    /// Restrict to one equivalence key
    pub equivalence_key: Option<String>,
    pub include_unsafe: bool,
}

impl FixScope {
    pub fn all(include_unsafe: bool) -> Self {
        Self {
            equivalence_key: None,
            include_unsafe,
        }
    }

    pub fn for_key(key: &str) -> Self {
        Self {
            equivalence_key: Some(key.to_string()),
            include_unsafe: false,
        }
    }

    pub fn with_unsafe(mut self, include: bool) -> Self {
        self.include_unsafe = include;
        self
    }

    fn allows(&self, edit: &Edit) -> bool {
        let safety_ok = match edit.safety {
            FixSafety::Safe => true,
            FixSafety::Unsafe => self.include_unsafe,
            FixSafety::Display => false,
        };
        safety_ok
            && self
                .equivalence_key
                .as_ref()
                .map_or(true, |k| *k == edit.equivalence_key)
    }
}

/// Computes and applies fixes for findings of rules in a registry
pub struct FixEngine {
    registry: Arc<RuleRegistry>,
    options: RuleOptions,
}

impl FixEngine {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self {
            registry,
            options: RuleOptions::new(),
        }
    }

    pub fn with_options(mut self, options: RuleOptions) -> Self {
        self.options = options;
        self
    }

    /// Compute the edit for a finding against `tree`
    pub fn compute_edit(
        &self,
        tree: &SyntaxTree,
        symbols: &dyn SymbolContext,
        finding: &Finding,
    ) -> Option<Edit> {
        let rule = self.registry.get(&finding.rule_id)?;
        let provider = rule.fix.as_ref()?;
        let Some(target) = tree.resolve(&finding.target).and_then(|id| tree.cursor(id)) else {
            log::debug!(
                "{}: target of {} at {} not found",
                tree.path().display(),
                finding.rule_id,
                finding.span
            );
            return None;
        };

        let ctx = FixContext {
            symbols,
            options: &self.options,
            rule_id: &rule.id,
            args: &finding.args,
        };
        let ops = provider.compute(&target, &ctx)?;
        Some(Edit {
            tree: tree.id(),
            file: tree.path().to_path_buf(),
            rule_id: rule.id.clone(),
            title: provider.title.clone(),
            equivalence_key: provider.equivalence_key.clone(),
            safety: provider.safety,
            anchor: target.span(),
            ops,
        })
    }

    /// Apply a batch of edits to `tree`, producing a new tree
    pub fn apply(&self, tree: &SyntaxTree, edits: &[Edit]) -> FixBatch {
        apply::apply_edits(tree, edits)
    }

    /// Code actions for the findings that have a computable fix
    pub fn code_actions(
        &self,
        tree: &SyntaxTree,
        symbols: &dyn SymbolContext,
        findings: &[Finding],
    ) -> Vec<CodeAction> {
        findings
            .iter()
            .filter(|f| f.has_fix() && f.file() == tree.path())
            .filter_map(|f| {
                let edit = self.compute_edit(tree, symbols, f)?;
                Some(CodeAction {
                    title: edit.title.clone(),
                    equivalence_key: edit.equivalence_key.clone(),
                    rule_id: f.rule_id.clone(),
                    location: f.location.clone(),
                    edit,
                })
            })
            .collect()
    }

    /// Fix every finding in scope as one batch
    ///
    /// Findings whose fix cannot be computed are reported as
    /// [`FixStatus::Unfixed`] after the batch outcomes.
    pub fn fix_all(
        &self,
        tree: &SyntaxTree,
        symbols: &dyn SymbolContext,
        findings: &[Finding],
        scope: &FixScope,
    ) -> FixBatch {
        let mut edits = Vec::new();
        let mut unfixed = Vec::new();
        for finding in findings.iter().filter(|f| f.has_fix() && f.file() == tree.path()) {
            match self.compute_edit(tree, symbols, finding) {
                Some(edit) if scope.allows(&edit) => edits.push(edit),
                Some(_) => {}
                None => unfixed.push(FixOutcome {
                    rule_id: finding.rule_id.clone(),
                    title: finding
                        .fix
                        .as_ref()
                        .map(|f| f.title.clone())
                        .unwrap_or_default(),
                    anchor: finding.span,
                    status: FixStatus::Unfixed,
                }),
            }
        }

        let mut batch = self.apply(tree, &edits);
        batch.outcomes.extend(unfixed);
        batch
    }
}

/// Unified diff between the rendered forms of two trees
pub fn preview_diff(path: &Path, before: &SyntaxTree, after: &SyntaxTree) -> String {
    unified_diff(path, &before.root().render(), &after.root().render())
}

/// Single-hunk unified diff with up to three lines of context
fn unified_diff(path: &Path, original: &str, modified: &str) -> String {
    const CONTEXT: usize = 3;
    let old: Vec<&str> = original.lines().collect();
    let new: Vec<&str> = modified.lines().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    if prefix == old.len() && prefix == new.len() {
        return String::new();
    }

    let start = prefix.saturating_sub(CONTEXT);
    let old_end = (old.len() - suffix + CONTEXT).min(old.len());
    let new_end = (new.len() - suffix + CONTEXT).min(new.len());

    let mut diff = format!("--- a/{}\n+++ b/{}\n", path.display(), path.display());
    diff.push_str(&format!(
        "@@ -{},{} +{},{} @@\n",
        start + 1,
        old_end - start,
        start + 1,
        new_end - start
    ));
    for line in &old[start..prefix] {
        diff.push_str(&format!(" {}\n", line));
    }
    for line in &old[prefix..old.len() - suffix] {
        diff.push_str(&format!("-{}\n", line));
    }
    for line in &new[prefix..new.len() - suffix] {
        diff.push_str(&format!("+{}\n", line));
    }
    for line in &old[old.len() - suffix..old_end] {
        diff.push_str(&format!(" {}\n", line));
    }
    diff
}
