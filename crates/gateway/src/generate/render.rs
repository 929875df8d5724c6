//! Text emitters for the generated manifest block and binding table.

use std::fmt::Write;

use super::{BindingContent, DependencySource, BINDINGS_MARKER, MANIFEST_MARKER};

/// Everything in `manifest` before the generated block, without trailing
/// whitespace.
pub fn strip_generated(manifest: &str) -> &str {
    let end = manifest.find(MANIFEST_MARKER).unwrap_or(manifest.len());
    manifest[..end].trim_end()
}

/// The generated block appended to the manifest: the marker followed by one
/// `[dependencies.<alias>]` table per pipe.
pub fn render_manifest_block(content: &BindingContent) -> String {
    let mut out = String::new();
    out.push_str(MANIFEST_MARKER);
    out.push('\n');

    for pipe in &content.pipes {
        let _ = write!(out, "\n[dependencies.{}]\n", pipe.alias);
        match &pipe.source {
            DependencySource::Path(path) => {
                let _ = writeln!(out, "path = {}", toml_string(path));
            }
            DependencySource::Git { url, tag } => {
                let _ = writeln!(out, "git = {}", toml_string(url));
                if let Some(tag) = tag {
                    let _ = writeln!(out, "tag = {}", toml_string(tag));
                }
            }
            DependencySource::Registry { version } => {
                let _ = writeln!(out, "version = {}", toml_string(version));
            }
        }
        if let Some(package) = &pipe.package {
            let _ = writeln!(out, "package = {}", toml_string(package));
        }
    }

    out
}

/// Full manifest text: hand-written part, blank line, generated block.
pub fn render_manifest(original: &str, content: &BindingContent) -> String {
    format!(
        "{}\n\n{}",
        strip_generated(original),
        render_manifest_block(content)
    )
}

/// Source of the binding table module.
pub fn render_bindings(content: &BindingContent) -> String {
    let mut calls = String::new();
    if content.pipes.is_empty() {
        calls.push_str("    let _ = registry;\n");
    }
    for pipe in &content.pipes {
        let _ = writeln!(
            calls,
            "    registry.register({}, {}::new)?;",
            rust_string(pipe.alias.as_str()),
            pipe.alias.crate_ident()
        );
    }

    let aliases = content
        .pipes
        .iter()
        .map(|pipe| rust_string(pipe.alias.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"{}

//! Pipes compiled into this binary.

use crate::errors::RegistryError;
use crate::registry::PipeRegistry;

/// Aliases of the compiled-in pipes, in registration order.
pub const PIPES: &[&str] = &[{}];

/// Construct every compiled-in pipe the configuration declares.
pub fn register(registry: &mut PipeRegistry) -> Result<(), RegistryError> {{
{}    Ok(())
}}
"#,
        BINDINGS_MARKER, aliases, calls
    )
}

fn toml_string(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

fn rust_string(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::binding_content;
    use pipeway_config::PipeDeclaration;

    #[test]
    fn test_strip_generated() {
        let manifest = "[package]\nname = \"x\"\n\n\n# Code generated by pipeway; DO NOT EDIT.\n\n[dependencies.a]\nversion = \"1\"\n";
        assert_eq!(strip_generated(manifest), "[package]\nname = \"x\"");
        assert_eq!(strip_generated("[package]\n\n"), "[package]");
    }

    #[test]
    fn test_manifest_block() {
        let content = binding_content(&[
            PipeDeclaration::new("../../pipes/echo", "0.1.0")
                .with_module("pipeway-echo-pipe")
                .with_alias("echo"),
            PipeDeclaration::new("github.com/org/limiter", "v1.2.0"),
            PipeDeclaration::new("headers", "0.3"),
        ])
        .unwrap();

        assert_eq!(
            render_manifest_block(&content),
            "# Code generated by pipeway; DO NOT EDIT.\n\
             \n[dependencies.limiter]\n\
             git = \"https://github.com/org/limiter\"\n\
             tag = \"v1.2.0\"\n\
             \n[dependencies.headers]\n\
             version = \"0.3\"\n\
             \n[dependencies.echo]\n\
             path = \"../../pipes/echo\"\n\
             package = \"pipeway-echo-pipe\"\n"
        );
    }

    #[test]
    fn test_bindings_source() {
        let content = binding_content(&[
            PipeDeclaration::new("github.com/org/rate-limit", "v1"),
            PipeDeclaration::new("a/b", "v1"),
        ])
        .unwrap();

        let source = render_bindings(&content);
        assert!(source.starts_with("// Code generated by pipeway; DO NOT EDIT.\n"));
        assert!(source.contains("pub const PIPES: &[&str] = &[\"b\", \"rate-limit\"];"));
        assert!(source.contains("    registry.register(\"b\", b::new)?;\n"));
        assert!(source.contains("    registry.register(\"rate-limit\", rate_limit::new)?;\n"));
    }

    #[test]
    fn test_bindings_without_pipes() {
        let source = render_bindings(&BindingContent::default());
        assert!(source.contains("pub const PIPES: &[&str] = &[];"));
        assert!(source.contains("    let _ = registry;\n    Ok(())\n"));
    }
}
