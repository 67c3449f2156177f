//! Filesystem watcher that keeps the fixture cache in sync with disk.
//!
//! OS notifications are forwarded over a channel to a task that evicts the
//! affected cache entries. The store itself never polls.

use crate::error::WatchError;
use crate::store::FixtureStore;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::EventKind;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A change to a file under the fixture root, relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl FixtureEvent {
    pub fn path(&self) -> &Path {
        match self {
            FixtureEvent::Added(p) | FixtureEvent::Changed(p) | FixtureEvent::Removed(p) => p,
        }
    }
}

/// Paths whose events are dropped: dotfiles plus configured globs.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    globs: GlobSet,
}

impl IgnoreRules {
    /// Compile ignore patterns.
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            globs: builder.build()?,
        })
    }

    /// Whether events for `rel` should be dropped.
    pub fn is_ignored(&self, rel: &Path) -> bool {
        let hidden = rel.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        });
        hidden || self.globs.is_match(rel)
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            globs: GlobSet::empty(),
        }
    }
}

/// Translate a raw notification into fixture events relative to `root`.
pub fn classify(root: &Path, ignore: &IgnoreRules, event: &Event) -> Vec<FixtureEvent> {
    let make: fn(PathBuf) -> FixtureEvent = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => FixtureEvent::Added,
        EventKind::Remove(_) => FixtureEvent::Removed,
        _ => FixtureEvent::Changed,
    };

    event
        .paths
        .iter()
        .filter_map(|path| path.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .filter(|rel| !ignore.is_ignored(rel))
        .map(|rel| make(rel.to_path_buf()))
        .collect()
}

/// Evict whatever the event touched.
///
/// Every kind evicts the path and everything beneath it. A renamed or
/// replaced directory only reports its own path, so its cached fixtures
/// must go with it.
pub fn apply_event(store: &FixtureStore, event: &FixtureEvent) {
    store.invalidate_tree(event.path());
}

/// Running watcher over a fixture root.
pub struct FixtureWatcher {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl FixtureWatcher {
    /// Watch the store's root recursively. Must be called inside a tokio runtime.
    pub fn start(store: Arc<FixtureStore>, ignore: IgnoreRules) -> Result<Self, WatchError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(store.root(), RecursiveMode::Recursive)?;

        let root = store.root().to_path_buf();
        info!(root = %root.display(), "Watching fixture tree for changes");

        let task = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for change in classify(&root, &ignore, &event) {
                            debug!(event = ?change, "Fixture changed on disk");
                            apply_event(&store, &change);
                        }
                    }
                    Err(e) => warn!(error = %e, "Filesystem watcher error"),
                }
            }
            debug!("Fixture watcher task finished");
        });

        Ok(Self {
            watcher: Some(watcher),
            task: Some(task),
        })
    }

    /// Stop delivering events. No invalidation happens after this returns.
    pub async fn stop(mut self) {
        // Dropping the OS watcher drops the sender, which ends the task.
        drop(self.watcher.take());
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("Fixture watcher stopped");
    }
}

impl Drop for FixtureWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
