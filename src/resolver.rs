//! Fixture path resolution.
//!
//! Maps a (lookup value, category) pair onto a file path relative to the
//! fixture root. Categories are searched hierarchically; requests without a
//! category are searched flat at the root. Both searches share one ordered
//! candidate list, so the first existing candidate always wins.

use crate::config::FixtureSettings;
use crate::sanitize::sanitize;
use crate::store::FixtureStore;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a resolved path sits in the search order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// A candidate file derived from the lookup value
    Match,
    /// The category's own default file
    CategoryDefault,
    /// The default file at the fixture root
    GlobalDefault,
}

/// A path chosen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Path relative to the fixture root
    pub path: PathBuf,
    pub kind: PathKind,
}

/// Resolves lookup values to fixture paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    prefixes: Vec<String>,
    default_file: String,
    config_file: String,
}

impl PathResolver {
    /// Build a resolver from fixture settings.
    pub fn new(settings: &FixtureSettings) -> Self {
        let mut prefixes: Vec<String> = Vec::new();
        if let Some((head, _)) = settings.lookup_field.split_once('_') {
            prefixes.push(format!("{}_", sanitize(head)));
        }
        for prefix in &settings.known_prefixes {
            if !prefixes.contains(prefix) {
                prefixes.push(prefix.clone());
            }
        }

        Self {
            prefixes,
            default_file: settings.default_file.clone(),
            config_file: settings.config_file.clone(),
        }
    }

    /// File name prefixes in the order they are tried.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Candidate file names for a lookup value, in search order.
    ///
    /// The value is sanitized first. The category config file is never a
    /// candidate.
    pub fn candidates(&self, lookup: &str) -> Vec<String> {
        let value = sanitize(lookup);
        self.prefixes
            .iter()
            .map(|prefix| format!("{}{}.json", prefix, value))
            .chain(std::iter::once(format!("{}.json", value)))
            .filter(|name| *name != self.config_file)
            .collect()
    }

    /// Path of the default fixture at the root.
    pub fn global_default(&self) -> PathBuf {
        PathBuf::from(&self.default_file)
    }

    /// Path of a category's default fixture.
    pub fn category_default(&self, category: &str) -> PathBuf {
        Path::new(&sanitize(category)).join(&self.default_file)
    }

    /// Path of a category's configuration file.
    pub fn category_config(&self, category: &str) -> PathBuf {
        Path::new(&sanitize(category)).join(&self.config_file)
    }

    /// Pick the fixture path for a request.
    ///
    /// A category that does not exist as a directory resolves straight to
    /// the global default; it never falls through to the flat search. When
    /// a category exists but no candidate matches, its default path is
    /// returned even if that file is missing, leaving the load-time
    /// fallback chain to handle it.
    pub fn resolve(
        &self,
        store: &FixtureStore,
        lookup: Option<&str>,
        category: Option<&str>,
    ) -> ResolvedPath {
        let category = category.map(sanitize).filter(|c| !c.is_empty());

        if let Some(category) = category {
            let dir = PathBuf::from(&category);
            if !store.is_dir(&dir) {
                debug!(category = %category, "Category directory missing, using global default");
                return self.global();
            }

            let category_default = dir.join(&self.default_file);
            return match lookup {
                Some(value) => self
                    .first_existing(store, &dir, value)
                    .unwrap_or(ResolvedPath {
                        path: category_default,
                        kind: PathKind::CategoryDefault,
                    }),
                None if store.exists(&category_default) => ResolvedPath {
                    path: category_default,
                    kind: PathKind::CategoryDefault,
                },
                None => self.global(),
            };
        }

        lookup
            .and_then(|value| self.first_existing(store, Path::new(""), value))
            .unwrap_or_else(|| self.global())
    }

    fn first_existing(&self, store: &FixtureStore, dir: &Path, value: &str) -> Option<ResolvedPath> {
        self.candidates(value)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| store.exists(path))
            .map(|path| {
                debug!(path = %path.display(), "Fixture candidate matched");
                ResolvedPath {
                    path,
                    kind: PathKind::Match,
                }
            })
    }

    fn global(&self) -> ResolvedPath {
        ResolvedPath {
            path: self.global_default(),
            kind: PathKind::GlobalDefault,
        }
    }
}
