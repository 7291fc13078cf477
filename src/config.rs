//! Playground configuration
//!
//! Settings are loaded from a TOML file such as:
//!
//! ```toml
//! [project]
//! host_dir = "web"
//! project_name = "Templates"
//! # template = "Invoice"   # pin a template instead of reading the pointer file
//!
//! [compiler]
//! escalate = ["W0002"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::compiler::WarningPolicy;
use crate::error::DiagnosticCode;

/// Pointer file naming the active template directory
pub const DEFAULT_POINTER_FILE: &str = "CurrentTemplateDirectory.txt";

/// Template source file inside a template directory
pub const DEFAULT_TEMPLATE_FILE: &str = "Template.tpl";

/// Default project directory name next to the host directory
pub const DEFAULT_PROJECT_NAME: &str = "Templates";

/// Build output directories never offered as template candidates
pub const DEFAULT_EXCLUDED_DIRS: [&str; 4] = ["target", "bin", "obj", "Properties"];

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid compiler.escalate entry: {0}")]
    UnknownDiagnostic(String),
}

/// Where the template project lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRoot {
    /// An explicit directory
    Path(PathBuf),
    /// `<host_dir>/../<project_name>`, next to the hosting application
    BesideHost {
        host_dir: PathBuf,
        project_name: String,
    },
}

impl ProjectRoot {
    pub fn resolve(&self) -> PathBuf {
        match self {
            ProjectRoot::Path(path) => path.clone(),
            ProjectRoot::BesideHost {
                host_dir,
                project_name,
            } => host_dir.join("..").join(project_name),
        }
    }
}

/// How the active template directory is chosen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemplateSelection {
    /// Read the pointer file in the project root on every render
    #[default]
    PointerFile,
    /// Always use this directory
    Named(String),
}

/// Configuration for the render pipeline
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    pub root: ProjectRoot,
    pub selection: TemplateSelection,
    /// Pointer file name, relative to the project root
    pub pointer_file: String,
    /// Template file name, relative to the template directory
    pub template_file: String,
    /// Directory names left out of the missing-directory message
    pub excluded_dirs: Vec<String>,
    pub warnings: WarningPolicy,
    /// Directory for scratch copies of compiled source
    pub scratch_dir: Option<PathBuf>,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct TomlConfig {
    project: TomlProject,
    compiler: TomlCompiler,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct TomlProject {
    root: Option<PathBuf>,
    host_dir: Option<PathBuf>,
    project_name: Option<String>,
    template: Option<String>,
    pointer_file: Option<String>,
    template_file: Option<String>,
    excluded_dirs: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct TomlCompiler {
    warnings_as_errors: bool,
    escalate: Vec<String>,
    scratch_dir: Option<PathBuf>,
}

impl PlaygroundConfig {
    /// Defaults with an explicit project root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: ProjectRoot::Path(root.into()),
            selection: TemplateSelection::PointerFile,
            pointer_file: DEFAULT_POINTER_FILE.to_string(),
            template_file: DEFAULT_TEMPLATE_FILE.to_string(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect(),
            warnings: WarningPolicy::default(),
            scratch_dir: None,
        }
    }

    /// Load configuration from a TOML file; relative paths are taken from the file's directory
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_str_in(&content, base)
    }

    /// Load configuration from a TOML string; relative paths stay relative
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_str_in(content, Path::new(""))
    }

    fn from_str_in(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let project = parsed.project;

        let root = match (project.root, project.host_dir) {
            (Some(root), _) => ProjectRoot::Path(base.join(root)),
            (None, Some(host_dir)) => ProjectRoot::BesideHost {
                host_dir: base.join(host_dir),
                project_name: project
                    .project_name
                    .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
            },
            (None, None) => ProjectRoot::Path(if base.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                base.to_path_buf()
            }),
        };

        let mut config = Self::new(".");
        config.root = root;
        if let Some(name) = project.template {
            config.selection = TemplateSelection::Named(name);
        }
        if let Some(pointer_file) = project.pointer_file {
            config.pointer_file = pointer_file;
        }
        if let Some(template_file) = project.template_file {
            config.template_file = template_file;
        }
        if let Some(excluded_dirs) = project.excluded_dirs {
            config.excluded_dirs = excluded_dirs;
        }

        config.warnings.all = parsed.compiler.warnings_as_errors;
        for code in &parsed.compiler.escalate {
            let code: DiagnosticCode = code.parse().map_err(ConfigError::UnknownDiagnostic)?;
            config.warnings.escalate.insert(code);
        }
        config.scratch_dir = parsed.compiler.scratch_dir.map(|dir| base.join(dir));

        Ok(config)
    }

    /// Resolved template project root
    pub fn project_root(&self) -> PathBuf {
        self.root.resolve()
    }

    pub fn with_root(mut self, root: ProjectRoot) -> Self {
        self.root = root;
        self
    }

    /// Pin the template directory instead of reading the pointer file
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.selection = TemplateSelection::Named(name.into());
        self
    }

    pub fn with_selection(mut self, selection: TemplateSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_template_file(mut self, name: impl Into<String>) -> Self {
        self.template_file = name.into();
        self
    }

    pub fn with_warnings(mut self, warnings: WarningPolicy) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PlaygroundConfig::new("/srv/templates");
        assert_eq!(config.project_root(), PathBuf::from("/srv/templates"));
        assert_eq!(config.selection, TemplateSelection::PointerFile);
        assert_eq!(config.pointer_file, "CurrentTemplateDirectory.txt");
        assert_eq!(config.template_file, "Template.tpl");
        assert_eq!(config.excluded_dirs, vec!["target", "bin", "obj", "Properties"]);
        assert!(!config.warnings.all);
    }

    #[test]
    fn test_root_beside_host() {
        let config = PlaygroundConfig::from_str(
            r#"
            [project]
            host_dir = "/srv/web"
            project_name = "Reports"
            "#,
        )
        .expect("Should parse");
        assert_eq!(
            config.project_root(),
            PathBuf::from("/srv/web").join("..").join("Reports")
        );
    }

    #[test]
    fn test_named_template_and_compiler_settings() {
        let config = PlaygroundConfig::from_str(
            r#"
            [project]
            root = "projects"
            template = "Invoice"
            excluded_dirs = ["build"]

            [compiler]
            warnings_as_errors = true
            escalate = ["W0002"]
            "#,
        )
        .expect("Should parse");
        assert_eq!(config.project_root(), PathBuf::from("projects"));
        assert_eq!(config.selection, TemplateSelection::Named("Invoice".to_string()));
        assert_eq!(config.excluded_dirs, vec!["build"]);
        assert!(config.warnings.all);
        assert!(config.warnings.escalate.contains(&DiagnosticCode::UnreachableCode));
    }

    #[test]
    fn test_relative_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playground.toml");
        std::fs::write(&path, "[project]\nroot = \"tpl\"\n[compiler]\nscratch_dir = \"tmp\"\n").unwrap();
        let config = PlaygroundConfig::from_file(&path).expect("Should load");
        assert_eq!(config.project_root(), dir.path().join("tpl"));
        assert_eq!(config.scratch_dir, Some(dir.path().join("tmp")));
    }

    #[test]
    fn test_unknown_escalation_code() {
        let err = PlaygroundConfig::from_str("[compiler]\nescalate = [\"W9999\"]").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDiagnostic(_)));
    }

    #[test]
    fn test_invalid_toml_error() {
        let err = PlaygroundConfig::from_str("this is not valid toml {{{{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = PlaygroundConfig::from_file(Path::new("/nonexistent/playground.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
