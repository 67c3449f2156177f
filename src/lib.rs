//! Fixture Mock Server
//!
//! Serves pre-authored JSON fixtures from a directory tree in response to
//! API requests, with request-driven placeholders and simulated latency.
//! Fixtures are cached in memory and evicted when they change on disk, so
//! edits take effect without a restart.
//!
//! # Features
//!
//! - **Hierarchical Lookup**: `<category>/<prefix><value>.json`, then the
//!   category default, then the global default
//! - **Flat Lookup**: Requests without a category search the root directly
//! - **Templates**: `{{request.user.id}}` placeholders filled from the query
//!   string and body
//! - **Latency Simulation**: Per-category `config.json` delays and
//!   per-request `_delay` overrides
//! - **Hot Reload**: Filesystem events evict cached fixtures
//!
//! # Example Layout
//!
//! ```text
//! responses/
//!   default.json
//!   user/
//!     default.json
//!     user_123.json
//!   transaction/
//!     config.json            {"delay": 1500}
//!     transaction_TXN1.json  {"id": "{{request.transactionId}}"}
//! ```

pub mod config;
pub mod delay;
pub mod engine;
pub mod error;
pub mod request;
pub mod resolver;
pub mod sanitize;
pub mod server;
pub mod store;
pub mod template;
pub mod watcher;

pub use config::MockServerConfig;
pub use engine::{Resolution, ResolutionEngine, ResponseSource};
pub use error::{FixtureError, WatchError};
pub use store::FixtureStore;
