//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("mounted");
//! warn!("remote command failed");
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `level` (from the config or the
/// `--log-level` flag) applies:
///
/// ```bash
/// RUST_LOG=debug adbfs mount /mnt/phone
/// RUST_LOG=adbfs::protocol=trace adbfs ls /sdcard
/// ```
pub fn init_tracing(level: &str) {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
