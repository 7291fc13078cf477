//! Change watching for template projects
//!
//! The renderer registers the project root after every successful render.
//! Registration must be idempotent: the same directory is only ever watched once,
//! however many renders happen.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("cannot watch {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Paths whose changes must not trigger a re-render, such as render output
/// written inside the watched project
#[derive(Debug, Clone, Default)]
pub struct IgnoredPaths {
    paths: Vec<PathBuf>,
}

impl IgnoredPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore `path` and, if it is a directory, everything below it
    pub fn with(mut self, path: &Path) -> Self {
        self.paths.push(normalize(path));
        self
    }

    pub fn covers(&self, path: &Path) -> bool {
        self.paths.iter().any(|ignored| path.starts_with(ignored))
    }

    /// Whether `event` touches anything outside the ignored paths
    pub fn is_relevant(&self, event: &Event) -> bool {
        event.paths.is_empty() || event.paths.iter().any(|path| !self.covers(path))
    }
}

/// Absolute, symlink-free form of `path`, which may not exist yet
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let Ok(canonical) = absolute.canonicalize() {
        return canonical;
    }
    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|parent| parent.join(name)),
        _ => None,
    };
    resolved.unwrap_or(absolute)
}

/// Something that can be told to watch a directory
pub trait ChangeWatcher: Send + Sync {
    /// Start watching `path` recursively; repeated calls for one path are no-ops
    fn watch(&self, path: &Path) -> Result<(), WatchError>;
}

/// Ignores every registration
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWatcher;

impl ChangeWatcher for NullWatcher {
    fn watch(&self, _path: &Path) -> Result<(), WatchError> {
        Ok(())
    }
}

struct WatchState {
    watcher: RecommendedWatcher,
    roots: HashSet<PathBuf>,
}

/// Filesystem watcher backed by `notify`
pub struct NotifyWatcher {
    state: Mutex<WatchState>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("roots", &self.watched())
            .finish()
    }
}

impl NotifyWatcher {
    /// Create a watcher that calls `on_change` for every filesystem event
    pub fn new<F>(on_change: F) -> Result<Self, WatchError>
    where
        F: Fn(&Event) + Send + 'static,
    {
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                tracing::debug!(kind = ?event.kind, paths = ?event.paths, "template project changed");
                on_change(&event);
            }
            Err(err) => tracing::warn!(error = %err, "file watcher error"),
        })?;
        Ok(Self {
            state: Mutex::new(WatchState {
                watcher,
                roots: HashSet::new(),
            }),
        })
    }

    /// Directories currently being watched, sorted
    pub fn watched(&self) -> Vec<PathBuf> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut roots: Vec<PathBuf> = state.roots.iter().cloned().collect();
        roots.sort();
        roots
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn watch(&self, path: &Path) -> Result<(), WatchError> {
        let root = path.canonicalize().map_err(|source| WatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.roots.contains(&root) {
            return Ok(());
        }
        state.watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(path = %root.display(), "watching template project");
        state.roots.insert(root);
        Ok(())
    }
}
