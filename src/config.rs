//! Configuration system
//!
//! Reads configuration from:
//! - `.thicket.yaml` / `.thicket.yml` / `.thicket.json` (project-level)
//! - the same names in the home directory (user-level)
//!
//! Per-rule parameters live in the flat `options` map (see
//! [`crate::options`]) or in an `.editorconfig`-style file named by
//! `options_file`.

use crate::diagnostic::Severity;
use crate::options::RuleOptions;
use crate::rule::{Rule, RuleCategory, RuleStability};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file names searched by [`Config::load_default`]
pub const CONFIG_NAMES: [&str; 3] = [".thicket.yaml", ".thicket.yml", ".thicket.json"];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Analyse compilation units in parallel
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,

    /// Dispatch nodes of a single unit in parallel
    pub parallel_dispatch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
            parallel_dispatch: false,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    pub color: ColorMode,

    pub verbose: bool,

    /// Show the summary line
    pub statistics: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: ColorMode::Auto,
            verbose: false,
            statistics: true,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Sarif,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "sarif" => Ok(OutputFormat::Sarif),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Enabled rules (empty = all)
    pub enabled: Vec<String>,

    /// Select rules by prefix (e.g., "Async" selects AsyncSuffix)
    pub extend: Vec<String>,

    /// Ignore rules by prefix
    pub ignore: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,

    /// Per-file rule ignores (glob pattern -> rule IDs, or "all")
    pub per_file: HashMap<String, Vec<String>>,

    /// Extra rule files (YAML or JSON) registered after the built-ins
    pub files: Vec<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extend from other configuration files or presets
    pub extends: Vec<String>,

    pub engine: EngineConfig,

    pub output: OutputConfig,

    pub rules: RulesConfig,

    /// Flat `<RuleId>.<name>` -> value map
    pub options: BTreeMap<String, serde_yaml::Value>,

    /// `.editorconfig`-style options file, merged under `options`
    pub options_file: Option<PathBuf>,

    /// Enable preview rules
    pub preview: bool,

    /// Rule categories to enable (empty = all)
    pub categories: Vec<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a preset configuration by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "recommended" => Some(Self::preset_recommended()),
            "strict" => Some(Self::preset_strict()),
            "minimal" => Some(Self::preset_minimal()),
            _ => None,
        }
    }

    fn preset_recommended() -> Self {
        Self {
            categories: vec![
                "correctness".to_string(),
                "suspicious".to_string(),
                "style".to_string(),
                "perf".to_string(),
            ],
            ..Self::default()
        }
    }

    fn preset_strict() -> Self {
        let mut config = Self {
            preview: true,
            ..Self::default()
        };
        config
            .rules
            .severity
            .insert("MissingConfigureAwait".to_string(), Severity::Error);
        config
    }

    fn preset_minimal() -> Self {
        Self {
            categories: vec!["correctness".to_string()],
            ..Self::default()
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        let base_dir = path.parent().unwrap_or(Path::new("."));
        config.rules.files = config
            .rules
            .files
            .iter()
            .map(|f| resolve(base_dir, f))
            .collect();
        config.options_file = config.options_file.as_deref().map(|f| resolve(base_dir, f));

        if !config.extends.is_empty() {
            let mut base_config = Self::default();

            for extend in &config.extends.clone() {
                let extended = match Self::preset(extend) {
                    Some(preset) => preset,
                    None => Self::load_with_depth(&resolve(base_dir, Path::new(extend)), depth + 1)?,
                };
                base_config.merge(extended);
            }

            base_config.merge(config);
            config = base_config;
        }

        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        self.engine.parallel = other.engine.parallel;
        if other.engine.parallel_dispatch {
            self.engine.parallel_dispatch = true;
        }

        if other.output.format != OutputFormat::Text {
            self.output.format = other.output.format;
        }
        if other.output.verbose {
            self.output.verbose = true;
        }
        if other.output.color != ColorMode::Auto {
            self.output.color = other.output.color;
        }
        if !other.output.statistics {
            self.output.statistics = false;
        }

        self.rules.disabled.extend(other.rules.disabled);
        if !other.rules.enabled.is_empty() {
            self.rules.enabled = other.rules.enabled;
        }
        self.rules.extend.extend(other.rules.extend);
        self.rules.ignore.extend(other.rules.ignore);
        self.rules.severity.extend(other.rules.severity);
        for (pattern, rules) in other.rules.per_file {
            self.rules.per_file.entry(pattern).or_default().extend(rules);
        }
        self.rules.files.extend(other.rules.files);

        self.options.extend(other.options);
        if other.options_file.is_some() {
            self.options_file = other.options_file;
        }

        if other.preview {
            self.preview = true;
        }
        if !other.categories.is_empty() {
            self.categories = other.categories;
        }
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        for name in &CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            for name in &CONFIG_NAMES {
                let path = home.join(name);
                if path.exists() {
                    return Self::load(&path);
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        format: Option<OutputFormat>,
        verbose: Option<bool>,
        jobs: Option<usize>,
        disabled_rules: Option<Vec<String>>,
        enabled_rules: Option<Vec<String>>,
    ) {
        if let Some(f) = format {
            self.output.format = f;
        }
        if let Some(v) = verbose {
            self.output.verbose = v;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
        }
        if let Some(disabled) = disabled_rules {
            self.rules.disabled.extend(disabled);
        }
        if let Some(enabled) = enabled_rules {
            self.rules.enabled = enabled;
        }
    }

    pub fn add_extend_prefixes(&mut self, prefixes: Vec<String>) {
        self.rules.extend.extend(prefixes);
    }

    pub fn add_ignore_prefixes(&mut self, prefixes: Vec<String>) {
        self.rules.ignore.extend(prefixes);
    }

    /// Check if a rule id passes the enable/disable/prefix lists
    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        if self.rules.disabled.iter().any(|r| r == rule_id) {
            return false;
        }

        if self.matches_ignore_prefix(rule_id) {
            return false;
        }

        if !self.rules.enabled.is_empty() {
            return self.rules.enabled.iter().any(|r| r == rule_id);
        }

        self.matches_extend_prefix(rule_id)
    }

    /// Check if a rule matches any prefix in the extend list
    pub fn matches_extend_prefix(&self, rule_id: &str) -> bool {
        if self.rules.extend.is_empty() {
            return true;
        }
        let rule_upper = rule_id.to_uppercase();
        self.rules
            .extend
            .iter()
            .any(|p| rule_upper.starts_with(&p.to_uppercase()))
    }

    /// Check if a rule matches any prefix in the ignore list
    pub fn matches_ignore_prefix(&self, rule_id: &str) -> bool {
        let rule_upper = rule_id.to_uppercase();
        self.rules
            .ignore
            .iter()
            .any(|p| rule_upper.starts_with(&p.to_uppercase()))
    }

    /// Whether a rule is active under id lists, category and stability settings
    ///
    /// Rules selected explicitly by id bypass the category and preview filters.
    pub fn is_rule_active(&self, rule: &Rule) -> bool {
        if !self.is_rule_enabled(&rule.id) {
            return false;
        }
        if self.rules.enabled.iter().any(|r| r == &rule.id) {
            return true;
        }
        if !rule.enabled {
            return false;
        }
        if rule.stability == RuleStability::Preview && !self.preview {
            return false;
        }
        self.is_category_enabled(rule.category)
    }

    pub fn is_category_enabled(&self, category: RuleCategory) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        let name = category.to_string();
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(&name))
    }

    /// Get severity override for a rule
    pub fn get_severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.rules.severity.get(rule_id).copied()
    }

    /// Compile the per-file ignore table; invalid globs are logged and skipped
    pub fn per_file_matchers(&self) -> Vec<(GlobMatcher, Vec<String>)> {
        let mut patterns: Vec<_> = self.rules.per_file.iter().collect();
        patterns.sort_by(|a, b| a.0.cmp(b.0));
        patterns
            .into_iter()
            .filter_map(|(pattern, rules)| match Glob::new(pattern) {
                Ok(glob) => Some((glob.compile_matcher(), rules.clone())),
                Err(e) => {
                    log::warn!("invalid per-file pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect()
    }

    /// Check if a rule should be ignored for a file
    pub fn should_ignore_rule_for_file(&self, rule_id: &str, file_path: &Path) -> bool {
        self.per_file_matchers().iter().any(|(matcher, rules)| {
            matcher.is_match(file_path) && rules.iter().any(|r| r == "all" || r == rule_id)
        })
    }

    /// Resolve flat options: `options_file` first, then the `options` map
    ///
    /// Values that are not scalars or lists of scalars are logged and ignored.
    pub fn rule_options(&self) -> RuleOptions {
        let mut options = match &self.options_file {
            Some(path) => match RuleOptions::load(path) {
                Ok(options) => options,
                Err(e) => {
                    log::warn!("cannot read options file {}: {}", path.display(), e);
                    RuleOptions::new()
                }
            },
            None => RuleOptions::new(),
        };

        let mut flat = BTreeMap::new();
        for (key, value) in &self.options {
            match option_value_to_string(value) {
                Some(text) => {
                    flat.insert(key.clone(), text);
                }
                None => log::warn!("option '{}' has an unsupported value, ignored", key),
            }
        }
        options.merge(RuleOptions::from_map(&flat));
        options
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn option_value_to_string(value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::Sequence(_) | Value::Mapping(_) => None,
                scalar => option_value_to_string(scalar),
            })
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(",")),
        _ => None,
    }
}
