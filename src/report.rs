//! The render pipeline
//!
//! One render reads the active template from disk, preprocesses and compiles
//! it, resolves its entry point, runs it against the caller's document and
//! returns the collected log together with the document's serialized bytes.
//! Nothing is cached between renders.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use serde::Serialize;

use crate::compiler::{
    next_unit_name, CompileOptions, CompiledUnit, Compiler, InProcessCompiler, LibraryCatalog,
};
use crate::config::{PlaygroundConfig, TemplateSelection};
use crate::document::Document;
use crate::preprocess::preprocess;
use crate::runtime::Value;
use crate::watch::{ChangeWatcher, NullWatcher};
use crate::RenderError;

/// Result of a successful render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    log: Vec<String>,
    rendered_bytes: Vec<u8>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    log: &'a [String],
    rendered_bytes: String,
}

impl Report {
    /// Formatted log lines, in call order
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn rendered_bytes(&self) -> &[u8] {
        &self.rendered_bytes
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<u8>) {
        (self.log, self.rendered_bytes)
    }

    /// JSON form for web hosts, with the bytes base64 encoded
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&JsonReport {
            log: &self.log,
            rendered_bytes: base64::engine::general_purpose::STANDARD.encode(&self.rendered_bytes),
        })
    }
}

/// Format one log call the way it appears in a [`Report`]
pub fn format_log_entry(line: i64, text: &str, value: &Value) -> String {
    format!("#{}: {}: {}", line, text, value)
}

/// Where the active template was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLocation {
    pub project_root: PathBuf,
    /// Template directory name, as selected
    pub name: String,
    pub directory: PathBuf,
    /// Template source file
    pub file: PathBuf,
}

/// Renders the active template of a project
pub struct ReportRenderer {
    config: PlaygroundConfig,
    catalog: LibraryCatalog,
    compiler: Box<dyn Compiler + Send + Sync>,
    watcher: Arc<dyn ChangeWatcher>,
}

impl std::fmt::Debug for ReportRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRenderer")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl ReportRenderer {
    pub fn new(config: PlaygroundConfig, watcher: Arc<dyn ChangeWatcher>) -> Self {
        Self {
            config,
            catalog: LibraryCatalog::standard(),
            compiler: Box::new(InProcessCompiler::new()),
            watcher,
        }
    }

    /// A renderer that does not watch for changes
    pub fn without_watcher(config: PlaygroundConfig) -> Self {
        Self::new(config, Arc::new(NullWatcher))
    }

    /// Use another compiler, e.g. one running out of process
    pub fn with_compiler(mut self, compiler: impl Compiler + Send + Sync + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    pub fn with_catalog(mut self, catalog: LibraryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// Resolve the active template directory and file
    pub fn locate_template(&self) -> Result<TemplateLocation, RenderError> {
        let project_root = self.config.project_root();
        let name = match &self.config.selection {
            TemplateSelection::Named(name) => name.clone(),
            TemplateSelection::PointerFile => {
                let pointer = project_root.join(&self.config.pointer_file);
                read_file(&pointer)?.trim().to_string()
            }
        };

        let directory = project_root.join(&name);
        if name.is_empty() || !directory.is_dir() {
            let candidates = self.candidates(&project_root)?;
            return Err(RenderError::DirectoryMissing {
                name,
                project_root,
                candidates,
            });
        }

        let file = directory.join(&self.config.template_file);
        Ok(TemplateLocation {
            project_root,
            name,
            directory,
            file,
        })
    }

    /// Sibling directories that could have been meant, sorted
    fn candidates(&self, project_root: &Path) -> Result<Vec<String>, RenderError> {
        let io_error = |source| RenderError::Io {
            path: project_root.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(project_root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            if !entry.file_type().map_err(io_error)?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.config.excluded_dirs.contains(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Preprocess and compile template source
    pub fn compile(&self, source: &str) -> Result<CompiledUnit, RenderError> {
        let _span = tracing::debug_span!("compile").entered();
        let preprocessed = preprocess(source);
        let references = self.catalog.references()?;
        let mut options =
            CompileOptions::new(next_unit_name()).with_warnings(self.config.warnings.clone());
        if let Some(dir) = &self.config.scratch_dir {
            options = options.with_scratch_dir(dir);
        }
        Ok(self.compiler.compile(&preprocessed, &references, &options)?)
    }

    /// Compile the active template without running it
    pub fn check(&self) -> Result<(TemplateLocation, CompiledUnit), RenderError> {
        let location = self.locate_template()?;
        let source = read_file(&location.file)?;
        let unit = self.compile(&source)?;
        unit.clone().into_template_type()?.entry_point()?;
        Ok((location, unit))
    }

    /// Render the active template into `document`
    pub fn render(&self, document: &mut dyn Document) -> Result<Report, RenderError> {
        let _span = tracing::info_span!("render").entered();
        let location = self.locate_template()?;
        tracing::debug!(template = %location.name, file = %location.file.display(), "rendering");

        let source = read_file(&location.file)?;
        let report = self.render_source(&source, document, &location.directory)?;
        self.watcher.watch(&location.project_root)?;

        tracing::info!(
            template = %location.name,
            entries = report.log.len(),
            bytes = report.rendered_bytes.len(),
            "rendered"
        );
        Ok(report)
    }

    /// Render template source directly, bypassing project lookup and watching
    pub fn render_source(
        &self,
        source: &str,
        document: &mut dyn Document,
        template_dir: &Path,
    ) -> Result<Report, RenderError> {
        let entry = self.compile(source)?.into_template_type()?.entry_point()?;

        let mut log = Vec::new();
        let mut sink = |line: i64, text: &str, value: &Value| {
            log.push(format_log_entry(line, text, value));
        };
        entry.invoke(document, &mut sink, &template_dir.to_string_lossy())?;

        let rendered_bytes = document.save();
        Ok(Report {
            log,
            rendered_bytes,
        })
    }
}

fn read_file(path: &Path) -> Result<String, RenderError> {
    fs::read_to_string(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}
