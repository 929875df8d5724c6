//! Build-time binding generator.
//!
//! Pipes are compiled into the gateway. Given the declared pipes, the
//! generator rewrites the gateway manifest so each pipe crate is a
//! dependency and regenerates the binding table that registers them. Both
//! artifacts are deterministic: the same declarations always produce the same
//! bytes.
//!
//! The manifest is rewritten in place. Everything from the marker line
//! onward is replaced; everything before it is preserved. While the rewrite
//! is in progress the original is kept next to it as `<manifest>.backup`;
//! a leftover backup means an earlier run failed half way, and the generator
//! refuses to run until it has been dealt with by hand.

pub mod render;

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pipeway_common::PipeAlias;
use pipeway_config::PipeDeclaration;

use crate::errors::GenerateError;

/// First line of the generated manifest block.
pub const MANIFEST_MARKER: &str = "# Code generated by pipeway; DO NOT EDIT.";

/// First line of the generated binding table.
pub const BINDINGS_MARKER: &str = "// Code generated by pipeway; DO NOT EDIT.";

/// Where a pipe crate is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// Local directory, relative to the manifest.
    Path(String),
    /// Git repository, pinned to a tag when a version is given.
    Git { url: String, tag: Option<String> },
    /// crates.io
    Registry { version: String },
}

/// One pipe as it appears in the generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeBinding {
    pub alias: PipeAlias,
    pub source: DependencySource,
    /// Package name when it differs from the alias.
    pub package: Option<String>,
}

impl PipeBinding {
    pub fn from_declaration(pipe: &PipeDeclaration) -> Result<Self, GenerateError> {
        let alias = pipe.alias();
        if !alias.is_valid_dependency_key() {
            return Err(GenerateError::InvalidAlias {
                alias: alias.to_string(),
                reason: "is not a valid dependency name",
            });
        }
        if alias.is_reserved_word() {
            return Err(GenerateError::InvalidAlias {
                alias: alias.to_string(),
                reason: "is a Rust keyword and cannot name a crate",
            });
        }

        let source = if pipe.is_local() {
            DependencySource::Path(pipe.import_path.clone())
        } else if pipe.is_repository() {
            DependencySource::Git {
                url: format!("https://{}", pipe.import_path.trim_end_matches('/')),
                tag: Some(pipe.version.clone()).filter(|v| !v.is_empty()),
            }
        } else {
            DependencySource::Registry {
                version: if pipe.version.is_empty() {
                    "*".to_string()
                } else {
                    pipe.version.clone()
                },
            }
        };

        let package = Some(pipe.package_name()).filter(|name| name != alias.as_str());

        Ok(Self {
            alias,
            source,
            package,
        })
    }
}

/// Sorted, deduplicated view of the declared pipes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingContent {
    pub pipes: Vec<PipeBinding>,
}

/// Build the generator's view of `pipes`.
///
/// Pipes are ordered by module id when present, else by import path.
/// Identical declarations collapse into one; two different pipes sharing an
/// alias are rejected.
pub fn binding_content(pipes: &[PipeDeclaration]) -> Result<BindingContent, GenerateError> {
    let mut sorted: Vec<&PipeDeclaration> = pipes.iter().collect();
    sorted.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

    let mut seen = HashSet::new();
    let mut bindings: Vec<PipeBinding> = Vec::with_capacity(sorted.len());
    for pipe in sorted {
        let binding = PipeBinding::from_declaration(pipe)?;
        if bindings.contains(&binding) {
            debug!(alias = %binding.alias, "Skipping duplicate pipe declaration");
            continue;
        }
        if !seen.insert(binding.alias.clone()) {
            return Err(GenerateError::DuplicateAlias(binding.alias.to_string()));
        }
        bindings.push(binding);
    }

    Ok(BindingContent { pipes: bindings })
}

impl BindingContent {
    /// Reject pipes whose alias names a dependency `manifest` already
    /// declares by hand. Keys are compared as crate identifiers, so
    /// `rate-limit` and `rate_limit` collide.
    pub fn check_manifest(&self, path: &Path, manifest: &str) -> Result<(), GenerateError> {
        let taken: BTreeSet<String> = manual_dependencies(manifest)
            .map_err(|source| GenerateError::Manifest {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(|key| key.replace('-', "_"))
            .collect();

        match self
            .pipes
            .iter()
            .find(|pipe| taken.contains(&pipe.alias.crate_ident()))
        {
            Some(pipe) => Err(GenerateError::InvalidAlias {
                alias: pipe.alias.to_string(),
                reason: "collides with a dependency already declared in the manifest",
            }),
            None => Ok(()),
        }
    }
}

/// Keys of the `[dependencies]` table outside the generated block.
pub fn manual_dependencies(manifest: &str) -> Result<BTreeSet<String>, toml::de::Error> {
    let table: toml::Table = render::strip_generated(manifest).parse()?;
    Ok(table
        .get("dependencies")
        .and_then(toml::Value::as_table)
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default())
}

/// Regenerates the gateway manifest and binding table.
#[derive(Debug, Clone)]
pub struct Generator {
    manifest: PathBuf,
    bindings: PathBuf,
}

impl Generator {
    pub fn new(manifest: impl Into<PathBuf>, bindings: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            bindings: bindings.into(),
        }
    }

    /// Generator for the gateway crate of the workspace rooted at `root`.
    pub fn for_workspace(root: &Path) -> Self {
        let crate_dir = root.join("crates").join("gateway");
        Self::new(
            crate_dir.join("Cargo.toml"),
            crate_dir.join("src").join("bindings.rs"),
        )
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    pub fn bindings(&self) -> &Path {
        &self.bindings
    }

    /// `<manifest>.backup`
    pub fn backup(&self) -> PathBuf {
        let mut path = self.manifest.clone().into_os_string();
        path.push(".backup");
        PathBuf::from(path)
    }

    /// Regenerate both artifacts from `pipes`.
    pub fn run(&self, pipes: &[PipeDeclaration]) -> Result<(), GenerateError> {
        let content = binding_content(pipes)?;
        info!(
            pipes = content.pipes.len(),
            manifest = %self.manifest.display(),
            bindings = %self.bindings.display(),
            "Generating pipe bindings"
        );

        let manifest =
            fs::read_to_string(&self.manifest).map_err(GenerateError::io("read", &self.manifest))?;
        content.check_manifest(&self.manifest, &manifest)?;

        self.write_manifest(&content)?;
        self.write_bindings(&content)?;

        info!("Pipe bindings generated");
        Ok(())
    }

    fn write_manifest(&self, content: &BindingContent) -> Result<(), GenerateError> {
        let backup = self.backup();
        if backup
            .try_exists()
            .map_err(GenerateError::io("check", &backup))?
        {
            return Err(GenerateError::StaleBackup(backup));
        }

        fs::rename(&self.manifest, &backup).map_err(GenerateError::io("back up", &self.manifest))?;
        debug!(backup = %backup.display(), "Manifest backed up");

        let original = fs::read_to_string(&backup).map_err(GenerateError::io("read", &backup))?;
        let rewritten = render::render_manifest(&original, content);

        write_synced(&self.manifest, &rewritten).map_err(GenerateError::io("write", &self.manifest))?;
        fs::remove_file(&backup).map_err(GenerateError::io("remove", &backup))?;
        debug!(manifest = %self.manifest.display(), "Manifest rewritten");
        Ok(())
    }

    fn write_bindings(&self, content: &BindingContent) -> Result<(), GenerateError> {
        match fs::remove_file(&self.bindings) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(GenerateError::io("remove", &self.bindings)(e)),
        }

        let source = render::render_bindings(content);
        write_synced(&self.bindings, &source).map_err(GenerateError::io("write", &self.bindings))?;
        debug!(bindings = %self.bindings.display(), "Binding table written");
        Ok(())
    }
}

fn write_synced(path: &Path, content: &str) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}
