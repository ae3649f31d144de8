//! Local staging cache
//!
//! Remote files are pulled into a flat staging directory before the kernel
//! reads or writes them. The cache file name is the remote path with every
//! `/` replaced by `-`, so `/sdcard/a.txt` lives at `<staging>/-sdcard-a.txt`.
//! The directory is wiped on every mount and filled lazily.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A remote path and its staging location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
	pub remote_path: String,
	pub local_path: PathBuf,
	/// A cache file currently exists for this path
	pub present: bool,
}

/// Cache file name for a remote path
///
/// Not reversible, and not injective once remote names contain `-`:
/// `/a-b` and `/a/b` share a file.
pub fn cache_file_name(remote: &str) -> String {
	remote.replace('/', "-")
}

pub struct StagingCache {
	root: PathBuf,
	flagged: Mutex<HashSet<String>>,
}

impl StagingCache {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		StagingCache { root: root.into(), flagged: Mutex::new(HashSet::new()) }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Remove the staging directory with all contents and recreate it (0755)
	pub fn reset(&self) -> io::Result<()> {
		match fs::remove_dir_all(&self.root) {
			Ok(()) => debug!("cleared staging directory {}", self.root.display()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => return Err(e),
		}
		fs::create_dir_all(&self.root)?;
		fs::set_permissions(&self.root, fs::Permissions::from_mode(0o755))?;
		self.flagged.lock().clear();
		Ok(())
	}

	/// Staging location for `remote`; no I/O
	pub fn local_path_for(&self, remote: &str) -> PathBuf {
		self.root.join(cache_file_name(remote))
	}

	/// Resolve `remote`, flagging names that may collide
	pub fn entry(&self, remote: &str) -> CacheEntry {
		self.flag_collision(remote);
		let local_path = self.local_path_for(remote);
		let present = local_path.is_file();
		CacheEntry { remote_path: remote.to_string(), local_path, present }
	}

	/// Warn once per path whose name already holds a `-`
	///
	/// Returns true the first time a path is flagged.
	pub fn flag_collision(&self, remote: &str) -> bool {
		if !remote.contains('-') {
			return false;
		}
		let mut flagged = self.flagged.lock();
		if !flagged.insert(remote.to_string()) {
			return false;
		}
		warn!(
			"{} contains '-' and may share the cache file {} with another path",
			remote,
			cache_file_name(remote)
		);
		true
	}

	/// Delete the cache file of `remote`; false if there was none
	pub fn discard(&self, remote: &str) -> io::Result<bool> {
		match fs::remove_file(self.local_path_for(remote)) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_example_mapping() {
		let cache = StagingCache::new("/tmp/adbfs");
		assert_eq!(cache.local_path_for("/sdcard/a.txt"), PathBuf::from("/tmp/adbfs/-sdcard-a.txt"));
	}

	#[test]
	fn test_mapping_is_deterministic() {
		let cache = StagingCache::new("/tmp/adbfs");
		for path in ["/", "/sdcard", "/sdcard/DCIM/img 01.jpg"] {
			assert_eq!(cache.local_path_for(path), cache.local_path_for(path));
		}
	}

	#[test]
	fn test_mapping_is_injective_without_dashes() {
		let corpus = [
			"/",
			"/sdcard",
			"/sdcard/",
			"/sdcard/a.txt",
			"/sdcard/a_txt",
			"/sdcard/Music/song.mp3",
			"/sdcardMusic/song.mp3",
			"/data/local/tmp/x",
			"/data/local/tmpx",
		];
		let names: HashSet<String> = corpus.iter().map(|p| cache_file_name(p)).collect();
		assert_eq!(names.len(), corpus.len());
	}

	#[test]
	fn test_dash_paths_collide_and_are_flagged() {
		let cache = StagingCache::new("/tmp/adbfs");
		assert_eq!(cache.local_path_for("/a-b"), cache.local_path_for("/a/b"));
		assert!(cache.flag_collision("/a-b"));
		assert!(!cache.flag_collision("/a-b"));
		assert!(!cache.flag_collision("/a/b"));
	}

	#[test]
	fn test_reset_wipes_and_recreates() {
		let dir = TempDir::new().unwrap();
		let root = dir.path().join("staging");
		let cache = StagingCache::new(&root);
		cache.reset().unwrap();

		fs::write(cache.local_path_for("/sdcard/a.txt"), b"stale").unwrap();
		assert!(cache.entry("/sdcard/a.txt").present);

		cache.reset().unwrap();
		assert!(root.is_dir());
		assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
		assert_eq!(fs::metadata(&root).unwrap().permissions().mode() & 0o777, 0o755);
		assert!(!cache.entry("/sdcard/a.txt").present);
	}

	#[test]
	fn test_discard() {
		let dir = TempDir::new().unwrap();
		let cache = StagingCache::new(dir.path());
		fs::write(cache.local_path_for("/x"), b"1").unwrap();
		assert!(cache.discard("/x").unwrap());
		assert!(!cache.discard("/x").unwrap());
	}
}

// vim: ts=4
