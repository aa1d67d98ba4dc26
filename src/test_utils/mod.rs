//! Test utilities for armforge
//!
//! Helpers shared by unit tests and the integration suite:
//! - [`init_test_logging`] for opt-in tracing output
//! - [`fixtures`] for handler files, app documents and an in-process compiler
//!
//! # Example
//!
//! ```rust,no_run
//! use armforge::test_utils::fixtures::{FakeCompiler, write_handler};
//!
//! let temp = tempfile::TempDir::new().unwrap();
//! let handler = write_handler(temp.path(), "orders", "export const run = () => 1;");
//! let compiler = FakeCompiler::new();
//! assert_eq!(compiler.calls(), 0);
//! ```

pub mod fixtures;

pub use fixtures::{AppFixture, FakeCompiler, write_handler};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=cache=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
