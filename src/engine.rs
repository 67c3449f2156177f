//! Response resolution engine.
//!
//! Ties together path resolution, the fixture store, templating, and delay
//! selection behind a single `resolve` call that never fails.

use crate::config::MockServerConfig;
use crate::delay::DelayResolver;
use crate::resolver::{PathKind, PathResolver};
use crate::sanitize::sanitize;
use crate::store::FixtureStore;
use crate::template::TemplateEngine;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which tier of the fallback chain produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// A fixture matched from the lookup value
    Fixture(PathBuf),
    /// The category's default fixture
    CategoryDefault(PathBuf),
    /// The default fixture at the root
    GlobalDefault,
    /// No fixture could be loaded; the built-in error document was used
    Synthetic,
}

impl ResponseSource {
    /// Short label for headers and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseSource::Fixture(_) => "fixture",
            ResponseSource::CategoryDefault(_) => "category-default",
            ResponseSource::GlobalDefault => "global-default",
            ResponseSource::Synthetic => "fallback",
        }
    }

    /// Whether the response came from somewhere other than the first pick.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ResponseSource::Fixture(_))
    }
}

/// A fully resolved response.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub body: Value,
    pub delay_ms: u64,
    pub source: ResponseSource,
}

/// Resolves requests to fixture bodies and delays.
pub struct ResolutionEngine {
    store: Arc<FixtureStore>,
    paths: PathResolver,
    delays: DelayResolver,
    templates: TemplateEngine,
}

impl ResolutionEngine {
    /// Create an engine over an opened store.
    pub fn new(store: Arc<FixtureStore>, config: &MockServerConfig) -> Self {
        Self {
            store,
            paths: PathResolver::new(&config.fixtures),
            delays: DelayResolver::new(&config.delay),
            templates: TemplateEngine::new(),
        }
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> &Arc<FixtureStore> {
        &self.store
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Resolve a request to a body and a delay.
    ///
    /// Falls back from the resolved path to the category default, then to
    /// the global default, then to a built-in error document. Delay is
    /// chosen independently of the body, except that responses served from
    /// the global default or the error document are never delayed.
    pub fn resolve(
        &self,
        lookup: Option<&str>,
        category: Option<&str>,
        request: &Value,
        explicit_delay_ms: Option<i64>,
    ) -> Resolution {
        let category = category.filter(|c| !sanitize(c).is_empty());
        let (doc, source) = self.load_with_fallback(lookup, category);

        let Some(doc) = doc else {
            warn!(
                lookup = ?lookup,
                category = ?category,
                "No response file available, serving error document"
            );
            return Resolution {
                body: json!({
                    "status": "error",
                    "message": "No response file available",
                }),
                delay_ms: 0,
                source,
            };
        };

        let body = self.templates.apply(&doc, request);
        let delay_ms = match &source {
            ResponseSource::GlobalDefault | ResponseSource::Synthetic => 0,
            _ => self
                .delays
                .resolve(&self.store, &self.paths, explicit_delay_ms, category),
        };

        debug!(source = source.label(), delay_ms, "Request resolved");
        Resolution {
            body,
            delay_ms,
            source,
        }
    }

    fn load_with_fallback(
        &self,
        lookup: Option<&str>,
        category: Option<&str>,
    ) -> (Option<Arc<Value>>, ResponseSource) {
        let resolved = self.paths.resolve(&self.store, lookup, category);

        if let Some(doc) = self.store.load(&resolved.path) {
            let source = match resolved.kind {
                PathKind::Match => ResponseSource::Fixture(resolved.path),
                PathKind::CategoryDefault => ResponseSource::CategoryDefault(resolved.path),
                PathKind::GlobalDefault => ResponseSource::GlobalDefault,
            };
            return (Some(doc), source);
        }

        if let Some(category) = category {
            let category_default = self.paths.category_default(category);
            if category_default != resolved.path {
                if let Some(doc) = self.store.load(&category_default) {
                    return (Some(doc), ResponseSource::CategoryDefault(category_default));
                }
            }
        }

        let global_default = self.paths.global_default();
        if global_default != resolved.path {
            if let Some(doc) = self.store.load(&global_default) {
                return (Some(doc), ResponseSource::GlobalDefault);
            }
        }

        (None, ResponseSource::Synthetic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn setup() -> (TempDir, ResolutionEngine) {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "default.json", r#"{"source":"global"}"#);
        write(&dir, "user/user_123.json", r#"{"id":123,"name":"Ada"}"#);
        write(&dir, "transaction/config.json", r#"{"delay":1500}"#);
        write(
            &dir,
            "transaction/transaction_TXN1.json",
            r#"{"id":"{{request.transactionId}}"}"#,
        );
        let store = Arc::new(FixtureStore::open(dir.path()).unwrap());
        let engine = ResolutionEngine::new(store, &MockServerConfig::default());
        (dir, engine)
    }

    #[test]
    fn test_category_fixture_without_delay() {
        let (_dir, engine) = setup();
        let res = engine.resolve(Some("123"), Some("user"), &json!({}), None);
        assert_eq!(res.body, json!({"id": 123, "name": "Ada"}));
        assert_eq!(res.delay_ms, 0);
        assert_eq!(res.source, ResponseSource::Fixture(PathBuf::from("user/user_123.json")));
    }

    #[test]
    fn test_templated_fixture_with_category_delay() {
        let (_dir, engine) = setup();
        let request = json!({"transactionId": "TXN1"});
        let res = engine.resolve(Some("TXN1"), Some("transaction"), &request, None);
        assert_eq!(res.body, json!({"id": "TXN1"}));
        assert_eq!(res.delay_ms, 1500);
    }

    #[test]
    fn test_explicit_delay_overrides_category() {
        let (_dir, engine) = setup();
        let request = json!({"transactionId": "TXN1"});
        let res = engine.resolve(Some("TXN1"), Some("transaction"), &request, Some(500));
        assert_eq!(res.body, json!({"id": "TXN1"}));
        assert_eq!(res.delay_ms, 500);

        let res = engine.resolve(Some("TXN1"), Some("transaction"), &request, Some(5000));
        assert_eq!(res.delay_ms, 1500);
    }

    #[test]
    fn test_missing_category_serves_global_default() {
        let (_dir, engine) = setup();
        for lookup in [Some("1"), Some("123"), None] {
            let res = engine.resolve(lookup, Some("order"), &json!({}), Some(100));
            assert_eq!(res.body, json!({"source": "global"}));
            assert_eq!(res.delay_ms, 0);
            assert_eq!(res.source, ResponseSource::GlobalDefault);
        }
    }

    #[test]
    fn test_category_default_preferred_over_global() {
        let (dir, engine) = setup();
        write(&dir, "transaction/default.json", r#"{"source":"transaction"}"#);

        let res = engine.resolve(Some("NOPE"), Some("transaction"), &json!({}), None);
        assert_eq!(res.body, json!({"source": "transaction"}));
        assert_eq!(res.delay_ms, 1500);
        assert_eq!(
            res.source,
            ResponseSource::CategoryDefault(PathBuf::from("transaction/default.json"))
        );
    }

    #[test]
    fn test_global_default_fallback_is_never_delayed() {
        let (_dir, engine) = setup();
        let res = engine.resolve(Some("NOPE"), Some("transaction"), &json!({}), Some(200));
        assert_eq!(res.body, json!({"source": "global"}));
        assert_eq!(res.delay_ms, 0);
        assert_eq!(res.source, ResponseSource::GlobalDefault);
    }

    #[test]
    fn test_malformed_fixture_falls_back() {
        let (dir, engine) = setup();
        write(&dir, "user/user_9.json", "{ broken");
        let res = engine.resolve(Some("9"), Some("user"), &json!({}), None);
        assert_eq!(res.body, json!({"source": "global"}));
        assert_eq!(res.source, ResponseSource::GlobalDefault);
    }

    #[test]
    fn test_exhausted_fallback_returns_error_document() {
        let (dir, engine) = setup();
        std::fs::remove_file(dir.path().join("default.json")).unwrap();

        let res = engine.resolve(Some("x"), Some("order"), &json!({}), Some(100));
        assert_eq!(
            res.body,
            json!({"status": "error", "message": "No response file available"})
        );
        assert_eq!(res.delay_ms, 0);
        assert_eq!(res.source, ResponseSource::Synthetic);
    }

    #[test]
    fn test_removed_fixture_after_invalidation() {
        let (dir, engine) = setup();
        let first = engine.resolve(Some("123"), Some("user"), &json!({}), None);
        assert_eq!(first.source.label(), "fixture");

        std::fs::remove_file(dir.path().join("user/user_123.json")).unwrap();
        engine.store().invalidate(Path::new("user/user_123.json"));

        let second = engine.resolve(Some("123"), Some("user"), &json!({}), None);
        assert_eq!(second.body, json!({"source": "global"}));
        assert_eq!(second.source, ResponseSource::GlobalDefault);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (_dir, engine) = setup();
        let request = json!({"transactionId": "TXN1"});
        let a = engine.resolve(Some("TXN1"), Some("transaction"), &request, None);
        let b = engine.resolve(Some("TXN1"), Some("transaction"), &request, None);
        assert_eq!(
            serde_json::to_vec(&a.body).unwrap(),
            serde_json::to_vec(&b.body).unwrap()
        );
    }

    #[test]
    fn test_template_does_not_leak_into_cache() {
        let (_dir, engine) = setup();
        engine.resolve(Some("TXN1"), Some("transaction"), &json!({"transactionId": "A"}), None);
        let res = engine.resolve(Some("TXN1"), Some("transaction"), &json!({}), None);
        assert_eq!(res.body, json!({"id": "{{request.transactionId}}"}));
    }

    #[test]
    fn test_traversal_attempts_never_escape() {
        let (_dir, engine) = setup();
        for (lookup, category) in [
            ("../../etc/passwd", "user"),
            ("123", "../user"),
            ("%2e%2e%2fdefault", "%2e%2e"),
            ("123\0", "user\0"),
        ] {
            let res = engine.resolve(Some(lookup), Some(category), &json!({}), None);
            assert_eq!(res.body, json!({"source": "global"}));
        }
    }

    #[test]
    fn test_flat_lookup_without_category() {
        let (dir, engine) = setup();
        write(&dir, "order_55.json", r#"{"order":"{{request.id}}"}"#);
        let res = engine.resolve(Some("55"), None, &json!({"id": "55"}), Some(10));
        assert_eq!(res.body, json!({"order": "55"}));
        assert_eq!(res.delay_ms, 10);
    }
}
