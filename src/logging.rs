//! Logging initialization
//!
//! A single initialization point for `tracing`. Every profile writes to
//! stderr: stdout is reserved for JSON envelopes.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Logging profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Profile {
    /// Human-readable output, debug level for this crate
    #[default]
    Development,
    /// JSON structured output, info level
    Production,
    /// Output captured by the test harness
    Test,
}

impl Profile {
    /// Filter used when `RUST_LOG` is unset or invalid
    #[must_use]
    pub const fn default_directive(&self) -> &'static str {
        match self {
            Self::Development | Self::Test => "bookshelf=debug",
            Self::Production => "bookshelf=info",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber for `profile`
///
/// Only the first call in a process has any effect. `RUST_LOG` overrides the
/// profile's default filter.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(profile.default_directive()));

        // try_init: a subscriber installed by an embedding process wins
        let _ = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            Profile::Test => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .try_init(),
        };
    });
}
