//! Pipe declarations: which pipes are compiled in and how they are addressed.

use pipeway_common::PipeAlias;
use serde::{Deserialize, Serialize};

/// A pipe compiled into the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PipeDeclaration {
    /// Where the pipe crate comes from: a local path (`./`, `../`, `/`), a
    /// repository path (`github.com/org/pipe`) or a registry crate name.
    #[serde(rename = "path")]
    pub import_path: String,

    /// Crate version, or the git tag for repository paths.
    #[serde(default)]
    pub version: String,

    /// Package name, when it differs from the last import path segment.
    #[serde(default)]
    pub module: Option<String>,

    /// Name used in `alias.Method` references.
    #[serde(default)]
    pub alias: Option<String>,

    /// Free-form configuration handed to the pipe constructor.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl PipeDeclaration {
    pub fn new(import_path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            version: version.into(),
            module: None,
            alias: None,
            config: serde_json::Map::new(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Effective alias: the explicit one, else the last import path segment.
    pub fn alias(&self) -> PipeAlias {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => PipeAlias::new(alias),
            _ => PipeAlias::from_import_path(&self.import_path),
        }
    }

    /// Module id when present, else the import path.
    pub fn sort_key(&self) -> &str {
        match self.module.as_deref() {
            Some(module) if !module.is_empty() => module,
            _ => &self.import_path,
        }
    }

    /// Package name of the pipe crate.
    pub fn package_name(&self) -> String {
        match self.module.as_deref() {
            Some(module) if !module.is_empty() => module.to_string(),
            _ => PipeAlias::from_import_path(&self.import_path)
                .as_str()
                .to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.import_path.starts_with('.') || self.import_path.starts_with('/')
    }

    pub fn is_repository(&self) -> bool {
        !self.is_local() && self.import_path.contains('/')
    }
}
