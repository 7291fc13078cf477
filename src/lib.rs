//! Report Playground - live-recompiling document templates
//!
//! This library compiles a small template language in process, runs the
//! template's entry point against a document and returns a line-annotated log
//! of the template's `log(...)` calls along with the rendered document bytes.
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use report_playground::{PlaygroundConfig, ReportRenderer, TextDocument};
//!
//! let source = r#"
//! class Hello {
//!     static fn fill(document: Document, log: fn(any)) {
//!         let who = "world";
//!         document.heading(1, "Hello " + who);
//!         log(who);
//!     }
//! }"#;
//!
//! let renderer = ReportRenderer::without_watcher(PlaygroundConfig::default());
//! let mut document = TextDocument::new();
//! let report = renderer.render_source(source, &mut document, Path::new(".")).unwrap();
//!
//! assert_eq!(report.log(), ["#6: who: world"]);
//! assert_eq!(report.rendered_bytes(), b"# Hello world\n");
//! ```

pub mod compiler;
pub mod config;
pub mod document;
pub mod entry;
pub mod error;
pub mod parser;
pub mod preprocess;
pub mod report;
pub mod runtime;
pub mod watch;

use std::path::PathBuf;

use thiserror::Error;

pub use compiler::{
    CompileOptions, CompiledUnit, Compiler, InProcessCompiler, LibraryCatalog, ReferenceError,
    ReferenceSet, TemplateType, WarningPolicy,
};
pub use config::{ConfigError, PlaygroundConfig, ProjectRoot, TemplateSelection};
pub use document::{Document, TextDocument};
pub use entry::{Arity, EntryPoint, EntryPointError};
pub use error::{CompileError, Diagnostic, DiagnosticCode, Severity};
pub use preprocess::preprocess;
pub use report::{Report, ReportRenderer, TemplateLocation};
pub use runtime::{RuntimeError, Value};
pub use watch::{ChangeWatcher, IgnoredPaths, NotifyWatcher, NullWatcher, WatchError};

/// Errors that can occur during a render
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The selected template directory does not exist in the project
    #[error(
        "Are you sure that directory {name} exists in template project? There are only {}.",
        .candidates.join(", ")
    )]
    DirectoryMissing {
        name: String,
        project_root: PathBuf,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    Compilation(#[from] CompileError),

    #[error("reference set: {0}")]
    References(#[from] ReferenceError),

    #[error("entry point: {0}")]
    EntryPoint(#[from] EntryPointError),

    #[error("template failed in {0}")]
    Invocation(#[from] RuntimeError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("cannot encode report: {0}")]
    Encode(#[from] serde_json::Error),
}
