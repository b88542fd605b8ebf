//! # Animal Matcher
//!
//! Registers animals from photos and identifies them again from new photos.
//!
//! ## How It Works
//! - **Register** - Photos are enhanced, embedded and stored under a new `ANI0001`-style id
//! - **Search** - Query photos are embedded the same way and ranked against every record
//! - **Skip, don't fail** - A bad photo is dropped from its batch; only an
//!   all-failed batch is an error
//!
//! ## Architecture
//! - `core` - Enhancement, embedding, registry, matching and the two workflows
//! - `config` - Layered runtime configuration
//! - `events` - Event-driven progress reporting
//! - `error` - Typed error taxonomy

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use config::MatcherConfig;
pub use error::{AnimalMatcherError, Result};

/// Initialize tracing for the library
///
/// `RUST_LOG` takes precedence; otherwise `verbose` selects `debug` over `warn`.
/// This should be called by the application entry point.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
