//! Dynamic compilation of template source
//!
//! Source is parsed, resolved against a [`ReferenceSet`] and lowered into a
//! [`CompiledUnit`] that runs inside this process. Every compilation gets a
//! unique unit name. The preprocessed source is written to a scratch file
//! named after the unit while it compiles, and that file is removed whether
//! compilation succeeds or fails.

pub mod library;
mod lower;
pub mod unit;

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;

use crate::error::{CompileError, Diagnostic, DiagnosticCode, Severity};
use crate::parser;

pub use library::{LibraryCatalog, ReferenceError, ReferenceSet};
pub use unit::{CompiledUnit, MethodId, MethodSignature, TemplateType, Ty, TypeInfo};

/// Compiles template source into a runnable unit
pub trait Compiler {
    fn compile(
        &self,
        source: &str,
        references: &ReferenceSet,
        options: &CompileOptions,
    ) -> Result<CompiledUnit, CompileError>;
}

/// Which warnings fail a compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningPolicy {
    /// Treat every warning as an error
    pub all: bool,
    /// Individual warning codes treated as errors
    pub escalate: HashSet<DiagnosticCode>,
}

impl WarningPolicy {
    pub fn all_as_errors() -> Self {
        Self {
            all: true,
            escalate: HashSet::new(),
        }
    }

    pub fn with_escalated(mut self, code: DiagnosticCode) -> Self {
        self.escalate.insert(code);
        self
    }

    fn apply(&self, diagnostic: &mut Diagnostic) {
        if diagnostic.severity == Severity::Warning
            && (self.all || self.escalate.contains(&diagnostic.code))
        {
            diagnostic.escalated = true;
        }
    }
}

/// Per-compilation settings
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub unit_name: String,
    pub warnings: WarningPolicy,
    /// Where the scratch copy of the source is written; the system temp dir if unset
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new(next_unit_name())
    }
}

impl CompileOptions {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            warnings: WarningPolicy::default(),
            scratch_dir: None,
        }
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

static UNIT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A fresh unit name, unique within this process
pub fn next_unit_name() -> String {
    format!("template-{}", UNIT_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Scratch copy of the source being compiled; deleted on drop
struct ScratchArtifact {
    file: NamedTempFile,
}

impl ScratchArtifact {
    fn create(dir: &Path, unit_name: &str, source: &str) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", unit_name))
            .suffix(".tpl")
            .tempfile_in(dir)?;
        file.write_all(source.as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    fn path(&self) -> &Path {
        self.file.path()
    }
}

/// The compiler used by the renderer: parses and lowers in this process
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessCompiler;

impl InProcessCompiler {
    pub fn new() -> Self {
        Self
    }

    fn scratch(&self, source: &str, options: &CompileOptions) -> Option<ScratchArtifact> {
        let dir = options
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        match ScratchArtifact::create(&dir, &options.unit_name, source) {
            Ok(artifact) => {
                tracing::trace!(path = %artifact.path().display(), "wrote scratch source");
                Some(artifact)
            }
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "could not write scratch source");
                None
            }
        }
    }
}

impl Compiler for InProcessCompiler {
    fn compile(
        &self,
        source: &str,
        references: &ReferenceSet,
        options: &CompileOptions,
    ) -> Result<CompiledUnit, CompileError> {
        let unit_name = options.unit_name.as_str();
        let _scratch = self.scratch(source, options);

        let file = parser::parse(source).map_err(|diagnostics| CompileError {
            unit: unit_name.to_string(),
            diagnostics,
        })?;

        let (mut unit, mut diagnostics) = lower::lower(&file, source, references, unit_name);
        for diagnostic in &mut diagnostics {
            options.warnings.apply(diagnostic);
        }
        diagnostics.sort_by_key(|d| d.span.start);

        if diagnostics.iter().any(Diagnostic::is_failure) {
            tracing::debug!(unit = unit_name, count = diagnostics.len(), "compilation failed");
            return Err(CompileError {
                unit: unit_name.to_string(),
                diagnostics,
            });
        }

        for warning in &diagnostics {
            tracing::debug!(unit = unit_name, "{}", warning);
        }
        unit.warnings = diagnostics;
        tracing::debug!(unit = unit_name, types = unit.types().len(), "compiled");
        Ok(unit)
    }
}
