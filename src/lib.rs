//! # adbfs - Android device filesystem over ADB
//!
//! adbfs mounts the filesystem of an attached Android device through the
//! ADB server's sync service. Files are pulled into a local staging cache
//! when opened and pushed back when written, while directory operations run
//! as escaped `adb shell` commands.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use adbfs::protocol::{AdbSync, DeviceSync};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = adbfs::Config::load(None)?;
//!     let device = AdbSync::new(&config.adb);
//!     let stat = device.stat("/sdcard/a.txt").await?;
//!     println!("{} bytes", stat.size);
//!     Ok(())
//! }
//! ```
//!
//! ## Building a bridge
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use adbfs::{Bridge, StagingCache};
//! use adbfs::protocol::AdbSync;
//! use adbfs::shell::AdbShell;
//!
//! let cache = StagingCache::new(&config.staging_dir);
//! cache.reset()?;
//! let bridge = Bridge::new(
//!     Arc::new(AdbSync::new(&config.adb)),
//!     Arc::new(AdbShell::new(&config.adb)),
//!     cache,
//!     config.strict_shell,
//! );
//! let fh = bridge.open("/sdcard/a.txt", libc::O_RDWR).await?;
//! bridge.write(fh, 0, b"hello")?;
//! bridge.release(fh).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fuse;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod shell;

// Re-export commonly used types
pub use cache::{CacheEntry, StagingCache};
pub use config::Config;
pub use error::{BridgeError, ConfigError, ConnectionError, ShellError};
pub use session::{Bridge, BridgeResult};

// vim: ts=4
