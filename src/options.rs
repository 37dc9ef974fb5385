//! Flat per-rule options
//!
//! Options come from the `options` map of a config file or from
//! `.editorconfig`-style text:
//!
//! ```text
//! # severity override; `none` disables the rule
//! BlockingCall.severity = warning
//! SpacingScale.allowed_values = 0,4,8,16
//! dotnet_diagnostic.HardcodedString.severity = none
//! ```
//!
//! Malformed entries are logged and ignored so the rule's default applies.
//! Numeric lists keep their valid elements; a session logs the skipped ones
//! once when it is built.

use crate::diagnostic::Severity;
use std::collections::BTreeMap;
use std::path::Path;

const SEVERITY_KEY: &str = "severity";
const DOTNET_PREFIX: &str = "dotnet_diagnostic.";

/// Severity setting taken from options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityOverride {
    /// Rule is switched off
    Disabled,
    Level(Severity),
}

impl std::str::FromStr for SeverityOverride {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "silent" | "off" => Ok(SeverityOverride::Disabled),
            other => other.parse::<Severity>().map(SeverityOverride::Level),
        }
    }
}

/// Numeric list parsed when the option is set
#[derive(Debug, Clone, Default, PartialEq)]
struct NumberList {
    valid: Vec<f64>,
    malformed: Vec<String>,
}

impl NumberList {
    fn parse(raw: &str) -> Self {
        let mut list = Self::default();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.parse::<f64>() {
                Ok(n) if n.is_finite() => list.valid.push(n),
                _ => list.malformed.push(item.to_string()),
            }
        }
        list
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOptions {
    /// `(rule id, parameter)` -> raw value
    values: BTreeMap<(String, String), String>,
    /// Same keys, read as comma-separated numbers
    numbers: BTreeMap<(String, String), NumberList>,
}

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key = value` lines; comments and `[section]` headers are skipped
    pub fn parse(text: &str) -> Self {
        let mut options = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with(';')
                || line.starts_with('[')
            {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    options.set(key, value);
                }
                None => log::warn!("options line {}: expected `key = value`, ignored", lineno + 1),
            }
        }
        options
    }

    /// Read options from an `.editorconfig`-style file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let mut options = Self::new();
        for (key, value) in map {
            options.set(key, value);
        }
        options
    }

    /// Set one option; returns false (after logging) when the entry is malformed
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let key = key.trim();
        let value = value.trim();
        let key = key.strip_prefix(DOTNET_PREFIX).unwrap_or(key);

        let Some((rule_id, param)) = key.split_once('.') else {
            log::warn!("option key '{}' is not of the form <RuleId>.<name>, ignored", key);
            return false;
        };
        let (rule_id, param) = (rule_id.trim(), param.trim());
        if rule_id.is_empty() || param.is_empty() {
            log::warn!("option key '{}' has an empty rule id or name, ignored", key);
            return false;
        }
        if param == SEVERITY_KEY && value.parse::<SeverityOverride>().is_err() {
            log::warn!(
                "invalid severity '{}' for rule {}, default severity kept",
                value,
                rule_id
            );
            return false;
        }

        let key = (rule_id.to_string(), param.to_string());
        if param != SEVERITY_KEY {
            self.numbers.insert(key.clone(), NumberList::parse(value));
        }
        self.values.insert(key, value.to_string());
        true
    }

    /// Merge another option set into this one (other takes precedence)
    pub fn merge(&mut self, other: RuleOptions) {
        self.values.extend(other.values);
        self.numbers.extend(other.numbers);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, rule_id: &str, param: &str) -> Option<&str> {
        self.values
            .get(&(rule_id.to_string(), param.to_string()))
            .map(String::as_str)
    }

    pub fn severity(&self, rule_id: &str) -> Option<SeverityOverride> {
        self.get(rule_id, SEVERITY_KEY)
            .and_then(|v| v.parse().ok())
    }

    /// Comma-separated list value
    pub fn list(&self, rule_id: &str, param: &str) -> Option<Vec<String>> {
        let raw = self.get(rule_id, param)?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Comma-separated numeric list, parsed once when the option was set
    ///
    /// Malformed elements are skipped; `None` when nothing valid remains.
    pub fn numbers(&self, rule_id: &str, param: &str) -> Option<&[f64]> {
        let list = self.numbers.get(&(rule_id.to_string(), param.to_string()))?;
        (!list.valid.is_empty()).then_some(list.valid.as_slice())
    }

    /// Log what `numbers` will skip for one option; returns false when the
    /// rule's default applies
    pub fn report_numbers(&self, rule_id: &str, param: &str) -> bool {
        let Some(list) = self.numbers.get(&(rule_id.to_string(), param.to_string())) else {
            return true;
        };
        if !list.malformed.is_empty() {
            log::warn!(
                "option {}.{}: ignoring non-numeric {}",
                rule_id,
                param,
                list.malformed.join(", ")
            );
        }
        if list.valid.is_empty() {
            log::warn!("option {}.{} has no numbers, default used", rule_id, param);
            return false;
        }
        true
    }

    /// Iterate `(rule id, parameter, value)` triples
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.values
            .iter()
            .map(|((rule, param), value)| (rule.as_str(), param.as_str(), value.as_str()))
    }
}
