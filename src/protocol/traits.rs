//! Device synchronization trait
//!
//! The bridge depends only on this trait, never on the ADB socket client,
//! so the session state machine can run against any device implementation.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::path::Path;

use super::error::ProtocolError;
use super::types::*;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// One-pass listing of a remote directory
///
/// Entries are decoded as they arrive on the wire. The stream ends after the
/// terminating record; it cannot be restarted.
pub type DirListing = BoxStream<'static, ProtocolResult<DirEntry>>;

/// The four sync service operations, each on its own session
#[async_trait]
pub trait DeviceSync: Send + Sync {
	/// Stat a remote path; the all-zero reply is `NotFound`
	async fn stat(&self, path: &str) -> ProtocolResult<StatResult>;

	/// Start listing a remote directory
	async fn list(&self, path: &str) -> ProtocolResult<DirListing>;

	/// Download `remote` into `local`, replacing its contents
	async fn pull(&self, remote: &str, local: &Path) -> ProtocolResult<()>;

	/// Upload `local` to `remote`, carrying its mode and mtime
	async fn push(&self, local: &Path, remote: &str) -> ProtocolResult<()>;
}

/// Drain a listing and count its entries
///
/// `Ok(0)` is an empty directory, distinct from any error.
pub async fn count_entries(mut listing: DirListing) -> ProtocolResult<usize> {
	let mut count = 0;
	while let Some(entry) = listing.next().await {
		entry?;
		count += 1;
	}
	Ok(count)
}


// vim: ts=4
