//! File session manager
//!
//! The bridge between filesystem calls and the device. It decides when a
//! remote file must be pulled into the staging cache before use, when local
//! edits must be pushed back, and how a local truncate interacts with both.
//!
//! Per path the state is one of:
//! - clean: the next open pulls a fresh copy
//! - truncated: the cache file was cut locally; the next open keeps it
//! - dirty: some open handle holds writes that are not yet on the device
//!
//! Mutations without a sync protocol message (mkdir, mv, rm, touch) go
//! through the shell channel. Every mutation that writes to the device is
//! followed by a remote `sync`.

pub mod state;

use futures::StreamExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::cache::StagingCache;
use crate::error::BridgeError;
use crate::protocol::{DeviceSync, DirEntry, NodeKind, ProtocolError, StatResult};
use crate::shell::{ShellExecutor, ShellOutput, ShellTarget};

pub use state::{PendingPush, Session, SessionRegistry};

pub type BridgeResult<T> = Result<T, BridgeError>;

const S_IFMT: u32 = 0o170000;

pub struct Bridge {
	device: Arc<dyn DeviceSync>,
	shell: Arc<dyn ShellExecutor>,
	cache: StagingCache,
	registry: SessionRegistry,
	strict_shell: bool,
}

impl Bridge {
	pub fn new(
		device: Arc<dyn DeviceSync>,
		shell: Arc<dyn ShellExecutor>,
		cache: StagingCache,
		strict_shell: bool,
	) -> Self {
		Bridge { device, shell, cache, registry: SessionRegistry::new(), strict_shell }
	}

	pub fn cache(&self) -> &StagingCache {
		&self.cache
	}

	pub fn registry(&self) -> &SessionRegistry {
		&self.registry
	}

	/// Remote stat; the size comes from the cache file while local edits
	/// are still unpushed
	pub async fn getattr(&self, path: &str) -> BridgeResult<StatResult> {
		let mut stat = self.device.stat(path).await.map_err(|e| lookup_error(path, e))?;
		if self.registry.has_dirty_session(path) || self.registry.is_truncated(path) {
			if let Ok(meta) = std::fs::metadata(self.cache.local_path_for(path)) {
				stat.size = meta.len();
			}
		}
		Ok(stat)
	}

	/// Every entry of a remote directory, device `.` and `..` included
	///
	/// An empty vector means the device sent no entries at all.
	pub async fn list_dir(&self, path: &str) -> BridgeResult<Vec<DirEntry>> {
		let mut listing = self.device.list(path).await.map_err(|e| lookup_error(path, e))?;
		let mut entries = Vec::new();
		while let Some(entry) = listing.next().await {
			entries.push(entry.map_err(|e| lookup_error(path, e))?);
		}
		Ok(entries)
	}

	/// Listing as the filesystem sees it: no entries is ENOENT
	pub async fn readdir(&self, path: &str) -> BridgeResult<Vec<DirEntry>> {
		let entries = self.list_dir(path).await?;
		if entries.is_empty() {
			return Err(BridgeError::NotFound { path: path.to_string() });
		}
		Ok(entries)
	}

	/// Open `path`, pulling it into the cache unless the cache is ahead
	///
	/// The cache is ahead of the device when a truncate is pending or when
	/// another handle on the same path holds unpushed writes. `flags` are the
	/// open(2) flags; only the access mode and `O_TRUNC` matter. Returns the
	/// session handle, which starts clean unless `O_TRUNC` cut the file.
	pub async fn open(&self, path: &str, flags: i32) -> BridgeResult<u64> {
		let entry = self.cache.entry(path);

		if self.registry.take_truncated(path) {
			debug!("open {}: truncated locally, keeping cache file", path);
		} else if self.registry.has_dirty_session(path) {
			debug!("open {}: unpushed writes on another handle, keeping cache file", path);
		} else {
			self.device.stat(path).await.map_err(|e| lookup_error(path, e))?;
			self.device.pull(path, &entry.local_path).await?;
		}

		let writable = flags & libc::O_ACCMODE != libc::O_RDONLY;
		let cut = writable && flags & libc::O_TRUNC != 0;
		let file = open_local(&entry.local_path, flags, cut)?;

		// A cut file differs from the device until it is pushed
		let handle = self.registry.insert(path, entry.local_path, file, cut);
		debug!("open {} -> handle {}", path, handle);
		Ok(handle)
	}

	/// Read up to `size` bytes at `offset`; short only at end of file
	pub fn read(&self, handle: u64, offset: u64, size: usize) -> BridgeResult<Vec<u8>> {
		let file = self.registry.file(handle).ok_or(BridgeError::BadHandle(handle))?;
		let mut buf = vec![0u8; size];
		let mut filled = 0;
		while filled < size {
			match file.read_at(&mut buf[filled..], offset + filled as u64) {
				Ok(0) => break,
				Ok(n) => filled += n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		}
		buf.truncate(filled);
		Ok(buf)
	}

	/// Write into the cache file and mark the session dirty
	pub fn write(&self, handle: u64, offset: u64, data: &[u8]) -> BridgeResult<usize> {
		let file = self.registry.file(handle).ok_or(BridgeError::BadHandle(handle))?;
		file.write_all_at(data, offset)?;
		self.registry.mark_dirty(handle);
		Ok(data.len())
	}

	/// Push pending writes of `handle`; a no-op when clean
	pub async fn flush(&self, handle: u64) -> BridgeResult<()> {
		if !self.registry.contains(handle) {
			return Err(BridgeError::BadHandle(handle));
		}
		match self.registry.take_dirty(handle) {
			Some(pending) => self.push_and_sync(&pending.local_path, &pending.remote_path).await,
			None => Ok(()),
		}
	}

	/// Push if still dirty, then drop the session
	///
	/// The session is gone even when the push fails.
	pub async fn release(&self, handle: u64) -> BridgeResult<()> {
		let session = self.registry.remove(handle).ok_or(BridgeError::BadHandle(handle))?;
		debug!("release handle {} ({})", handle, session.remote_path);
		if session.dirty {
			self.push_and_sync(&session.local_path, &session.remote_path).await?;
		}
		Ok(())
	}

	/// Permission checks are left to the device
	pub fn access(&self, _path: &str, _mask: i32) -> BridgeResult<()> {
		Ok(())
	}

	/// Bump the remote timestamps to now
	pub async fn utimens(&self, path: &str) -> BridgeResult<()> {
		self.run_remote(&format!("touch \"{}\"", path)).await?;
		Ok(())
	}

	/// Cut `path` to `size` bytes
	///
	/// The current contents are pulled first unless the path is absent on
	/// the device or an open session already holds local edits. The cut
	/// cache file is pushed right away when the device has the file; open
	/// sessions stay as dirty or clean as they were.
	pub async fn truncate(&self, path: &str, size: u64) -> BridgeResult<()> {
		let entry = self.cache.entry(path);

		let on_device = if self.registry.has_dirty_session(path) {
			debug!("truncate {}: local edits pending, not pulling", path);
			true
		} else {
			match self.device.stat(path).await {
				Ok(_) => {
					self.device.pull(path, &entry.local_path).await?;
					true
				}
				Err(e) if e.is_not_found() => {
					debug!("truncate {}: absent on device", path);
					false
				}
				Err(e) => return Err(e.into()),
			}
		};

		let file = OpenOptions::new().write(true).create(true).open(&entry.local_path)?;
		file.set_len(size)?;
		drop(file);

		self.registry.set_truncated(path);
		let open = self.registry.mark_truncated_sessions(path);
		debug!("truncated {} to {} bytes ({} open sessions)", path, size, open);

		if on_device {
			self.push_and_sync(&entry.local_path, path).await?;
		}
		Ok(())
	}

	/// Create an empty regular file on the device
	pub async fn mknod(&self, path: &str, mode: u32) -> BridgeResult<()> {
		if mode & S_IFMT != 0 && !NodeKind::is_regular_mode(mode) {
			return Err(BridgeError::Unsupported {
				what: format!("node type {:?} for {}", NodeKind::from_mode(mode), path),
			});
		}

		let entry = self.cache.entry(path);
		let file = OpenOptions::new().write(true).create(true).truncate(true).open(&entry.local_path)?;
		// The cache file must stay readable and writable by the mounting user
		file.set_permissions(std::fs::Permissions::from_mode((mode & 0o7777) | 0o600))?;
		drop(file);

		self.registry.clear_truncated(path);
		self.push_and_sync(&entry.local_path, path).await
	}

	pub async fn mkdir(&self, path: &str) -> BridgeResult<()> {
		self.run_remote(&format!("mkdir '{}'", path)).await?;
		Ok(())
	}

	pub async fn rename(&self, from: &str, to: &str) -> BridgeResult<()> {
		self.run_remote(&format!("mv '{}' '{}'", from, to)).await?;
		self.registry.rename(from, to);
		Ok(())
	}

	pub async fn rmdir(&self, path: &str) -> BridgeResult<()> {
		self.run_remote(&format!("rmdir '{}'", path)).await?;
		Ok(())
	}

	/// Remove the remote file, its cache file and any pending truncate
	pub async fn unlink(&self, path: &str) -> BridgeResult<()> {
		self.run_remote(&format!("rm '{}'", path)).await?;
		self.cache.discard(path)?;
		self.registry.clear_truncated(path);
		Ok(())
	}

	/// Symlink target as printed by the device's `ls -l`
	pub async fn readlink(&self, path: &str) -> BridgeResult<String> {
		let output = self.run_remote(&format!("ls -l --color=none \"{}\"", path)).await?;
		output
			.first_line()
			.and_then(parse_link_target)
			.ok_or_else(|| BridgeError::InvalidLink { path: path.to_string() })
	}

	/// Upload a cache file and flush the device's buffers
	pub async fn push_and_sync(&self, local: &Path, remote: &str) -> BridgeResult<()> {
		if let Err(e) = self.device.push(local, remote).await {
			error!("push {} -> {} failed: {}", local.display(), remote, e);
			return Err(e.into());
		}
		self.run_remote("sync").await?;
		Ok(())
	}

	/// Run a command on the device
	///
	/// A failing command is logged; it becomes an error only in strict mode.
	pub async fn run_remote(&self, command: &str) -> BridgeResult<ShellOutput> {
		let output = self.shell.run(ShellTarget::Remote, command).await?;
		if !output.success() {
			warn!("remote command '{}' failed with status {:?}", command, output.code);
			if self.strict_shell {
				return Err(BridgeError::ShellFailed { command: command.to_string(), code: output.code });
			}
		}
		Ok(output)
	}
}

/// Errors on the stat/open paths: anything but a timeout reads as absence
fn lookup_error(path: &str, e: ProtocolError) -> BridgeError {
	if e.is_timeout() {
		return BridgeError::Protocol(e);
	}
	if let ProtocolError::LocalIo(_) = e {
		return BridgeError::Protocol(e);
	}
	debug!("{}: {}", path, e);
	BridgeError::NotFound { path: path.to_string() }
}

fn open_local(path: &Path, flags: i32, cut: bool) -> io::Result<File> {
	let mut options = OpenOptions::new();
	match flags & libc::O_ACCMODE {
		libc::O_WRONLY => options.write(true),
		libc::O_RDWR => options.read(true).write(true),
		_ => options.read(true),
	};
	options.truncate(cut).custom_flags(flags & libc::O_NOFOLLOW);
	options.open(path)
}

/// Target of an `ls -l` symlink line, leading slashes removed
pub fn parse_link_target(line: &str) -> Option<String> {
	let (_, target) = line.split_once(" -> ")?;
	let target = target.trim_start_matches('/').trim_end();
	if target.is_empty() {
		return None;
	}
	Some(target.to_string())
}


// vim: ts=4
