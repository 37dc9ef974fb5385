//! Thicket - rule-based static analysis over host-supplied syntax trees
//!
//! A host hands over an immutable syntax tree plus a semantic model for
//! each compilation unit. Declarative rules are registered once, indexed by
//! the node kinds they trigger on, and evaluated in one pass per unit.
//! Findings can be turned into fixes, which are applied as a batch to
//! produce a new tree that shares every untouched subtree with the input.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Analyzer -> AnalysisSession -> RuleRegistry -> Rule -> Predicate
//!                     \-> FixEngine -> Edit batch -> rewritten SyntaxTree
//! ```
//!
//! # Rule files
//!
//! Rules can also be loaded from YAML or JSON:
//!
//! ```yaml
//! rules:
//!   - id: NoGodClass
//!     message: "Type {0} declares too many members"
//!     triggers: [class_decl]
//!     predicate: { type: name_ends_with, suffixes: [Manager] }
//!     args: [{ type: name }]
//!     severity: info
//! ```

pub mod catalog;
pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod fix;
pub mod options;
pub mod output;
pub mod predicate;
pub mod registry;
pub mod rule;
pub mod semantic;
pub mod session;
pub mod syntax;
pub mod unit;

// Re-export main types
pub use catalog::{builtin_registry, builtin_rules};
pub use config::Config;
pub use diagnostic::{Finding, FixSafety, Location, Severity};
pub use engine::{AnalysisResult, Analyzer, UnitFix};
pub use fix::{
    CodeAction, Edit, EditOp, FixBatch, FixEngine, FixMode, FixOutcome, FixScope, FixStatus,
};
pub use options::RuleOptions;
pub use output::{JsonFormatter, OutputFormatter, SarifFormatter, TextFormatter};
pub use predicate::{EvalContext, Predicate};
pub use registry::{RegistryHandle, RuleRegistry};
pub use rule::{Rule, RuleCategory, RuleFile};
pub use semantic::{SemanticModel, Symbol, SymbolContext, SymbolKind, TypeRef};
pub use session::{AnalysisSession, CancellationToken, SessionError, SessionReport};
pub use syntax::{Cursor, NodeBuilder, NodeKind, Span, SyntaxNode, SyntaxTree};
pub use unit::CompilationUnit;
