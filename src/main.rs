//! Thicket CLI - rule-based analysis of host-supplied compilation units

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use glob::glob;
use std::path::PathBuf;
use std::sync::Arc;
use thicket::config::{ColorMode, Config, OutputFormat};
use thicket::engine::AnalysisResult;
use thicket::fix::{preview_diff, FixMode, FixScope, FixStatus};
use thicket::output::formatter_for;
use thicket::registry::{RegistryHandle, RuleRegistry};
use thicket::rule::{RuleFile, RuleStability};
use thicket::session::SessionError;
use thicket::{builtin_registry, Analyzer, CompilationUnit, FixSafety, Rule, Severity};

#[derive(Parser)]
#[command(
    name = "thicket",
    version,
    about = "Rule-based static analysis over host-supplied syntax trees",
    long_about = "Analyses compilation units (syntax tree plus semantic facts, as YAML or JSON) \
                  with declarative rules and applies their fixes as conflict-free batches."
)]
struct Cli {
    /// Unit files or glob patterns to analyse
    files: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `.editorconfig`-style rule options file
    #[arg(long)]
    options: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Disable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    disable: Option<Vec<String>>,

    /// Only enable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    select: Option<Vec<String>>,

    /// Select rules by prefix (e.g., 'Async' selects AsyncSuffix)
    #[arg(long, value_delimiter = ',')]
    extend: Option<Vec<String>>,

    /// Ignore rules by prefix
    #[arg(long, value_delimiter = ',')]
    ignore: Option<Vec<String>>,

    /// Extra rule files (YAML or JSON)
    #[arg(long = "rules")]
    rule_files: Vec<PathBuf>,

    /// Minimum severity to report
    #[arg(long, value_enum)]
    min_severity: Option<MinSeverity>,

    /// Enable preview rules
    #[arg(long)]
    preview: bool,

    /// Only enable rules from specific categories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Apply fixes (dry-run unless --write is given)
    #[arg(long)]
    fix: bool,

    /// Write fixed units back to their files
    #[arg(long, requires = "fix")]
    write: bool,

    /// Only apply fixes with this equivalence key
    #[arg(long)]
    fix_only: Option<String>,

    /// Include unsafe fixes (may change code behavior)
    #[arg(long)]
    unsafe_fixes: bool,

    /// Show a diff of the fixes instead of applying them
    #[arg(long)]
    diff: bool,

    /// List the fixes on offer without applying them
    #[arg(long)]
    show_fixes: bool,

    /// Exit with 0 even if errors are found
    #[arg(long)]
    exit_zero: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    timing: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detailed information about a rule
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Sarif,
}

#[derive(Clone, Copy, ValueEnum)]
enum MinSeverity {
    Info,
    Warning,
    Error,
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    }
}

/// Print a rule in the `--list-rules` layout
fn print_rule(rule: &Rule) {
    let stability_marker = match rule.stability {
        RuleStability::Preview => " [preview]".yellow(),
        RuleStability::Deprecated => " [deprecated]".red(),
        RuleStability::Stable => "".normal(),
    };
    let fix_marker = if rule.fix.is_some() { " [fix]".green() } else { "".normal() };

    println!(
        "    {} [{}] ({}){}{}",
        rule.id.cyan(),
        severity_label(rule.severity),
        rule.category,
        stability_marker,
        fix_marker
    );
    if let Some(desc) = &rule.description {
        println!("      {}", desc);
    }
    if !rule.tags.is_empty() {
        println!("      Tags: {}", rule.tags.join(", "));
    }
}

/// Print detailed rule explanation
fn explain_rule(rule: &Rule) {
    println!("{}", "Rule Details".bold());
    println!();
    println!("  {}: {}", "ID".bold(), rule.id.cyan());
    if let Some(name) = &rule.name {
        println!("  {}: {}", "Name".bold(), name);
    }
    println!("  {}: {}", "Severity".bold(), severity_label(rule.severity));
    println!("  {}: {}", "Category".bold(), rule.category);
    println!("  {}: {}", "Stability".bold(), rule.stability);
    let triggers: Vec<_> = rule.triggers.iter().map(|k| k.to_string()).collect();
    println!("  {}: {}", "Triggers".bold(), triggers.join(", "));
    if let Some(warning) = rule.deprecation_warning() {
        println!("  {}", warning.red());
    }

    if let Some(desc) = &rule.description {
        println!();
        println!("  {}", "Description".bold());
        println!("  {}", desc);
    }

    if let Some(rationale) = &rule.rationale {
        println!();
        println!("  {}", "Rationale".bold());
        println!("  {}", rationale);
    }

    if let Some(bad) = &rule.example_bad {
        println!();
        println!("  {} {}", "Example".bold(), "(incorrect)".red());
        for line in bad.lines() {
            println!("    {}", line);
        }
    }

    if let Some(good) = &rule.example_good {
        println!();
        println!("  {} {}", "Example".bold(), "(correct)".green());
        for line in good.lines() {
            println!("    {}", line);
        }
    }

    if let Some(fix) = &rule.fix {
        println!();
        println!("  {}", "Auto-fix Available".bold());
        println!("  {} ({}, key {})", fix.title, fix.safety, fix.equivalence_key);
    }

    if let Some(docs) = &rule.docs {
        println!();
        println!("  {}: {}", "Documentation".bold(), docs.blue());
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default().unwrap_or_else(|e| {
            log::warn!("ignoring default config: {}", e);
            Config::default()
        }),
    };

    let format = match cli.format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Sarif => OutputFormat::Sarif,
    };
    config.merge_cli(
        Some(format),
        Some(cli.verbose),
        cli.jobs,
        cli.disable.clone(),
        cli.select.clone(),
    );
    if let Some(prefixes) = &cli.extend {
        config.add_extend_prefixes(prefixes.clone());
    }
    if let Some(prefixes) = &cli.ignore {
        config.add_ignore_prefixes(prefixes.clone());
    }
    if let Some(categories) = &cli.categories {
        config.categories = categories.clone();
    }
    if cli.preview {
        config.preview = true;
    }
    if cli.options.is_some() {
        config.options_file = cli.options.clone();
    }
    config.rules.files.extend(cli.rule_files.iter().cloned());
    if cli.no_color {
        config.output.color = ColorMode::Never;
    }
    Ok(config)
}

/// Built-in rules followed by every configured rule file
fn load_registry(config: &Config) -> anyhow::Result<RuleRegistry> {
    let mut registry = builtin_registry();
    for path in &config.rules.files {
        let file = RuleFile::load(path)
            .with_context(|| format!("failed to load rules from {}", path.display()))?;
        log::info!("loaded {} rules from {}", file.rules.len(), path.display());
        registry.extend(file.rules);
    }
    Ok(registry)
}

fn expand_patterns(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let paths = glob(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
        for entry in paths.flatten() {
            if entry.is_file() {
                files.push(entry);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn recount(result: &mut AnalysisResult) {
    result.error_count = result.findings.iter().filter(|f| f.is_error()).count();
    result.warning_count = result.findings.iter().filter(|f| f.is_warning()).count();
    result.info_count = result
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Info)
        .count();
}

fn fix_mode(cli: &Cli) -> FixMode {
    if cli.show_fixes {
        FixMode::ShowOnly
    } else if cli.diff {
        FixMode::Diff
    } else if cli.unsafe_fixes {
        FixMode::All
    } else {
        FixMode::SafeOnly
    }
}

/// Run the fix stage over loaded units; returns the number of fixes applied
fn run_fixes(
    cli: &Cli,
    analyzer: &Analyzer,
    units: &[(PathBuf, CompilationUnit)],
) -> anyhow::Result<usize> {
    let mode = fix_mode(cli);
    let mut scope = match &cli.fix_only {
        Some(key) => FixScope::for_key(key),
        None => FixScope::default(),
    };
    scope = scope.with_unsafe(cli.unsafe_fixes);

    let mut applied = 0;
    let mut rejected = 0;
    let mut unfixed = 0;
    let mut files_modified = 0;

    for (source, unit) in units {
        if mode == FixMode::ShowOnly {
            let actions = match analyzer.code_actions(unit) {
                Ok(actions) => actions,
                Err(e) => {
                    eprintln!("{}: {}", "error".red().bold(), e);
                    continue;
                }
            };
            for action in actions {
                let safety = match action.edit.safety {
                    FixSafety::Safe => "safe".green(),
                    FixSafety::Unsafe => "unsafe".yellow(),
                    FixSafety::Display => "display".blue(),
                };
                println!(
                    "{}:{}:{}: {} [{}] ({})",
                    action.location.file.display(),
                    action.location.line,
                    action.location.column,
                    action.title,
                    action.rule_id.cyan(),
                    safety
                );
            }
            continue;
        }

        let outcome = match analyzer.fix(unit, &scope) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                continue;
            }
        };
        applied += outcome.batch.applied();
        rejected += outcome.batch.rejected();
        unfixed += outcome.batch.unfixed();
        if cli.verbose {
            for o in &outcome.batch.outcomes {
                if let FixStatus::Rejected { reason } | FixStatus::Dropped { reason } = &o.status {
                    eprintln!(
                        "{}: {} at {}: {}",
                        "skipped".yellow(),
                        o.rule_id,
                        o.anchor.start,
                        reason
                    );
                }
            }
        }

        if !outcome.batch.is_changed() {
            continue;
        }
        if mode == FixMode::Diff {
            print!("{}", preview_diff(&unit.path, &outcome.before, &outcome.batch.tree));
        } else if cli.write {
            unit.with_tree(&outcome.batch.tree)
                .save(source)
                .with_context(|| format!("failed to write {}", source.display()))?;
            files_modified += 1;
        }
    }

    if mode != FixMode::ShowOnly {
        if cli.write && mode != FixMode::Diff {
            eprintln!("Applied {} fixes to {} files", applied, files_modified);
        } else {
            eprintln!("{}: {} fixes available", "dry-run".cyan(), applied);
            if mode != FixMode::Diff {
                eprintln!("Use --write to apply fixes");
            }
        }
        if rejected > 0 {
            eprintln!(
                "{}: {} fixes conflicted with others in the same batch; run again to apply them",
                "note".blue(),
                rejected
            );
        }
        if unfixed > 0 && cli.verbose {
            eprintln!("{}: {} findings have no computable fix", "note".blue(), unfixed);
        }
    }
    Ok(applied)
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = load_config(&cli)?;
    match config.output.color {
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Auto => {}
    }
    let registry = load_registry(&config)?;

    if let Some(Commands::Explain { rule_id }) = &cli.command {
        match registry.get(rule_id) {
            Some(rule) => {
                explain_rule(rule);
                return Ok(());
            }
            None => {
                eprintln!("{}: Rule '{}' not found", "error".red().bold(), rule_id);
                eprintln!();
                eprintln!("Use {} to see all available rules", "--list-rules".cyan());
                std::process::exit(1);
            }
        }
    }

    if cli.list_rules {
        println!("{}", "Available rules:".bold());
        println!();
        for rule in registry.rules() {
            print_rule(rule);
        }
        println!();
        println!("{} rules", registry.len());
        return Ok(());
    }

    if cli.files.is_empty() {
        eprintln!("{}: No files specified", "error".red().bold());
        eprintln!();
        eprintln!("Usage: thicket [OPTIONS] <FILES>...");
        eprintln!();
        eprintln!("For more information, try '--help'");
        std::process::exit(2);
    }

    let files = expand_patterns(&cli.files)?;
    if files.is_empty() {
        eprintln!("{}: No files found to analyse", "error".red().bold());
        std::process::exit(1);
    }
    if cli.verbose {
        eprintln!("Analysing {} units...", files.len());
    }

    let mut units = Vec::with_capacity(files.len());
    let mut unreadable = Vec::new();
    for path in files {
        match CompilationUnit::load(&path) {
            Ok(unit) => units.push((path, unit)),
            Err(e) => unreadable.push(SessionError::Aborted {
                file: path,
                reason: e.to_string(),
            }),
        }
    }

    let use_color = match config.output.color {
        ColorMode::Never => false,
        ColorMode::Always => true,
        ColorMode::Auto => !cli.no_color,
    };
    let format = config.output.format;
    let analyzer = Analyzer::new(config, Arc::new(RegistryHandle::new(registry)));

    if cli.fix || cli.diff || cli.show_fixes {
        run_fixes(&cli, &analyzer, &units)?;
        if cli.diff || cli.show_fixes {
            return Ok(());
        }
    }

    // report what remains after any written fixes
    let reload: Vec<CompilationUnit> = if cli.fix && cli.write {
        let mut reloaded = Vec::with_capacity(units.len());
        for (path, _) in &units {
            match CompilationUnit::load(path) {
                Ok(unit) => reloaded.push(unit),
                Err(e) => unreadable.push(SessionError::Aborted {
                    file: path.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        reloaded
    } else {
        units.into_iter().map(|(_, unit)| unit).collect()
    };

    let mut result = analyzer.analyze(&reload);
    result.units_processed += unreadable.len();
    result.aborted.extend(unreadable);

    if let Some(min_sev) = cli.min_severity {
        let min = match min_sev {
            MinSeverity::Info => Severity::Info,
            MinSeverity::Warning => Severity::Warning,
            MinSeverity::Error => Severity::Error,
        };
        result.findings.retain(|f| f.severity >= min);
        recount(&mut result);
    }

    let formatter = formatter_for(format, use_color);
    print!("{}", formatter.format(&result));

    if cli.timing {
        eprintln!();
        eprintln!("{}", result.format_timings());
    }

    let code = match result.exit_code() {
        1 if cli.exit_zero => 0,
        code => code,
    };
    std::process::exit(code);
}
