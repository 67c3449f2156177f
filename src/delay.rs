//! Artificial latency for fixture responses.

use crate::config::DelaySettings;
use crate::error::FixtureError;
use crate::resolver::PathResolver;
use crate::store::FixtureStore;
use serde::Deserialize;
use tracing::{debug, warn};

/// Contents of a category `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryConfig {
    /// Delay in milliseconds applied to every fixture in the category
    #[serde(default)]
    pub delay: Option<f64>,
}

impl CategoryConfig {
    /// The configured delay, if it is a positive finite number.
    pub fn delay_ms(&self) -> Option<u64> {
        self.delay
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
            .filter(|d| *d > 0)
    }
}

/// Picks the delay for a request.
#[derive(Debug, Clone)]
pub struct DelayResolver {
    max_override_ms: u64,
}

impl DelayResolver {
    pub fn new(settings: &DelaySettings) -> Self {
        Self {
            max_override_ms: settings.max_override_ms,
        }
    }

    /// The explicit override, if it lies in `[1, max_override_ms)`.
    pub fn accept_override(&self, explicit_ms: Option<i64>) -> Option<u64> {
        explicit_ms
            .filter(|ms| *ms >= 1)
            .map(|ms| ms as u64)
            .filter(|ms| *ms < self.max_override_ms)
    }

    /// Delay in milliseconds: valid override, then category config, then 0.
    ///
    /// The category config is read through the store cache but is never
    /// templated. Malformed configs are logged and count as no delay.
    pub fn resolve(
        &self,
        store: &FixtureStore,
        paths: &PathResolver,
        explicit_ms: Option<i64>,
        category: Option<&str>,
    ) -> u64 {
        if let Some(ms) = self.accept_override(explicit_ms) {
            debug!(delay_ms = ms, "Using explicit delay override");
            return ms;
        }
        if explicit_ms.is_some() {
            debug!(requested = ?explicit_ms, max = self.max_override_ms, "Ignoring out-of-range delay override");
        }

        category
            .filter(|c| !c.is_empty())
            .and_then(|c| self.category_delay(store, paths, c))
            .unwrap_or(0)
    }

    fn category_delay(&self, store: &FixtureStore, paths: &PathResolver, category: &str) -> Option<u64> {
        let rel = paths.category_config(category);
        let doc = match store.try_load(&rel) {
            Ok(doc) => doc,
            Err(FixtureError::NotFound(_)) => return None,
            Err(e) => {
                warn!(path = %rel.display(), kind = e.kind(), error = %e, "Ignoring unreadable category config");
                return None;
            }
        };

        match CategoryConfig::deserialize(&*doc) {
            Ok(config) => config.delay_ms(),
            Err(e) => {
                warn!(path = %rel.display(), error = %e, "Ignoring malformed category config");
                None
            }
        }
    }
}
