//! ADB sync protocol layer
//!
//! The bridge depends only on the [`DeviceSync`] trait. [`AdbSync`] is the
//! production implementation: one ADB server connection per operation,
//! switched to the device's `sync:` service.
//!
//! # Example Usage
//!
//! ```ignore
//! use adbfs::protocol::{AdbSync, DeviceSync};
//!
//! let device = AdbSync::new(&config.adb);
//! let stat = device.stat("/sdcard/a.txt").await?;
//! device.pull("/sdcard/a.txt", Path::new("/tmp/a.txt")).await?;
//! ```

pub mod client;
pub mod error;
pub mod traits;
pub mod transport;
pub mod types;
pub mod wire;

// Re-export public API
pub use client::{AdbSync, SyncConnection};
pub use error::ProtocolError;
pub use traits::{count_entries, DeviceSync, DirListing, ProtocolResult};
pub use types::{DirEntry, NodeKind, StatResult};

// vim: ts=4
