//! Compilation-unit files: a host tree plus its semantic facts
//!
//! ```yaml
//! path: src/FooViewModel.cs
//! tree:
//!   root: 0
//!   nodes:
//!     - { id: 0, kind: class_decl, span: { start: 0, end: 40 }, children: [1] }
//!     - { id: 1, kind: identifier, span: { start: 6, end: 18 }, text: FooViewModel }
//! semantics:
//!   - { start: 0, end: 40, kind: class_decl, symbol: { name: FooViewModel, kind: type } }
//! ```

use crate::semantic::SemanticModel;
use crate::syntax::{HostTree, SyntaxTree};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unit file error
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("JSON parse error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unknown unit file format: {}", .0.display())]
    UnknownFormat(PathBuf),
}

/// One source file as supplied by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Source path findings are reported against; defaults to the unit file
    #[serde(default)]
    pub path: PathBuf,
    pub tree: HostTree,
    #[serde(default)]
    pub semantics: SemanticModel,
}

impl CompilationUnit {
    pub fn new(path: impl Into<PathBuf>, tree: HostTree, semantics: SemanticModel) -> Self {
        Self {
            path: path.into(),
            tree,
            semantics,
        }
    }

    /// Load a unit file (`.json`, `.yaml` or `.yml`)
    pub fn load(path: &Path) -> Result<Self, UnitError> {
        let content = std::fs::read_to_string(path).map_err(|source| UnitError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut unit: CompilationUnit = match ext {
            "json" => serde_json::from_str(&content).map_err(|source| UnitError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|source| UnitError::Yaml {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(UnitError::UnknownFormat(path.to_path_buf())),
        };

        if unit.path.as_os_str().is_empty() {
            unit.path = path.to_path_buf();
        }
        log::debug!(
            "loaded unit {} ({} nodes, {} semantic entries)",
            unit.path.display(),
            unit.tree.nodes.len(),
            unit.semantics.len()
        );
        Ok(unit)
    }

    /// Write the unit back in the format its extension names
    pub fn save(&self, path: &Path) -> Result<(), UnitError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = match ext {
            "json" => serde_json::to_string_pretty(self).map_err(|source| UnitError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            "yaml" | "yml" => serde_yaml::to_string(self).map_err(|source| UnitError::Yaml {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(UnitError::UnknownFormat(path.to_path_buf())),
        };
        std::fs::write(path, content).map_err(|source| UnitError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Copy of this unit carrying a rewritten tree
    ///
    /// Semantic entries are kept; they stay valid for every node whose
    /// span the rewrite did not change.
    pub fn with_tree(&self, tree: &SyntaxTree) -> Self {
        Self {
            path: self.path.clone(),
            tree: HostTree::from_tree(tree),
            semantics: self.semantics.clone(),
        }
    }
}
