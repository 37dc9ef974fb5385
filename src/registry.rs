//! Rule registry and kind-indexed dispatch

use crate::diagnostic::{Finding, FixHint, Severity};
use crate::options::RuleOptions;
use crate::predicate::EvalContext;
use crate::rule::{format_message, Rule};
use crate::semantic::SymbolContext;
use crate::syntax::{Cursor, NodeKind};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Inputs shared by every rule dispatched on one tree
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    pub symbols: &'a dyn SymbolContext,
    pub options: &'a RuleOptions,
    pub file: &'a Path,
}

/// The set of rules a session runs, indexed by trigger kind
///
/// Registering an id that already exists replaces the earlier rule in its
/// original slot, so dispatch order stays stable across replacements.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    ids: HashMap<String, usize>,
    by_kind: HashMap<NodeKind, Vec<usize>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(rule);
        }
        registry
    }

    /// Add a rule; returns the rule it replaced, if any
    pub fn register(&mut self, rule: Rule) -> Option<Rule> {
        if rule.triggers.is_empty() {
            log::warn!("rule {} has no trigger kinds and will never run", rule.id);
        }

        if let Some(&slot) = self.ids.get(&rule.id) {
            log::debug!("replacing rule {} in slot {}", rule.id, slot);
            let previous = std::mem::replace(&mut self.rules[slot], rule);
            self.reindex();
            return Some(previous);
        }

        let slot = self.rules.len();
        log::debug!("registering rule {} on {:?}", rule.id, rule.triggers);
        self.ids.insert(rule.id.clone(), slot);
        for kind in &rule.triggers {
            let slots = self.by_kind.entry(kind.clone()).or_default();
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
        self.rules.push(rule);
        None
    }

    /// Register every rule of a rule file
    pub fn extend(&mut self, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            self.register(rule);
        }
    }

    fn reindex(&mut self) {
        self.by_kind.clear();
        for (slot, rule) in self.rules.iter().enumerate() {
            for kind in &rule.triggers {
                let slots = self.by_kind.entry(kind.clone()).or_default();
                if !slots.contains(&slot) {
                    slots.push(slot);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.ids.get(id).map(|&slot| &self.rules[slot])
    }

    /// Rules in registration order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Slots of the rules triggered by `kind`, in registration order
    pub fn slots_for(&self, kind: &NodeKind) -> &[usize] {
        self.by_kind.get(kind).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Evaluate every enabled rule triggered by the node's kind
    pub fn dispatch(&self, node: &Cursor<'_>, ctx: &DispatchContext<'_>) -> Vec<Finding> {
        let severities: Vec<Option<Severity>> = self
            .rules
            .iter()
            .map(|r| r.enabled.then_some(r.severity))
            .collect();
        self.dispatch_selected(node, ctx, &severities, &mut |_, _, _| {})
    }

    /// Dispatch with a per-slot severity; `None` skips the rule
    ///
    /// `observe` is called after each evaluation with the slot, the time
    /// spent and whether the rule matched.
    pub fn dispatch_selected(
        &self,
        node: &Cursor<'_>,
        ctx: &DispatchContext<'_>,
        severities: &[Option<Severity>],
        observe: &mut dyn FnMut(usize, Duration, bool),
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        for &slot in self.slots_for(node.kind()) {
            let Some(severity) = severities.get(slot).copied().flatten() else {
                continue;
            };
            let rule = &self.rules[slot];
            let eval = EvalContext::new(ctx.symbols, ctx.options, &rule.id, ctx.file);

            let start = Instant::now();
            let result = rule.evaluate(node, &eval);
            observe(slot, start.elapsed(), result.matched);

            if !result.matched {
                continue;
            }
            let location = result.location.unwrap_or(*node);
            let message = format_message(&rule.message, &result.format_args);
            let mut finding = Finding::new(
                &rule.id,
                severity,
                &message,
                ctx.file,
                node.node_ref(),
                location.node_ref(),
            )
            .with_args(result.format_args);
            if let Some(desc) = &rule.description {
                finding = finding.with_help(desc);
            }
            if let Some(fix) = &rule.fix {
                finding = finding.with_fix(FixHint {
                    title: fix.title.clone(),
                    equivalence_key: fix.equivalence_key.clone(),
                    safety: fix.safety,
                });
            }
            findings.push(finding);
        }
        findings
    }
}

/// Shared, swappable reference to the active registry
///
/// Readers take a snapshot and dispatch on it; a swap never affects a
/// snapshot already taken.
#[derive(Debug, Default)]
pub struct RegistryHandle {
    current: RwLock<Arc<RuleRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleRegistry> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the registry; returns the previous one
    pub fn swap(&self, registry: RuleRegistry) -> Arc<RuleRegistry> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(registry))
    }

    /// Copy the current registry, modify the copy and swap it in
    pub fn update(&self, f: impl FnOnce(&mut RuleRegistry)) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RuleRegistry::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }
}
