//! Per-mount session bookkeeping
//!
//! Open file handles, the pending-write set and the truncated-path flags all
//! live here. Each map has its own lock; no lock is ever held across an
//! await point, so callers copy out what they need before talking to the
//! device.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State of one open file handle
#[derive(Debug)]
pub struct Session {
	pub remote_path: String,
	pub local_path: PathBuf,
	/// Cache file descriptor, fixed for the life of the session
	pub file: Arc<File>,
	/// Local writes not yet pushed
	pub dirty: bool,
	/// The path was truncated while this session was open
	pub truncated_since_open: bool,
}

/// Handles and paths to push for a dirty session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPush {
	pub handle: u64,
	pub remote_path: String,
	pub local_path: PathBuf,
}

pub struct SessionRegistry {
	sessions: Mutex<HashMap<u64, Session>>,
	truncated: Mutex<HashSet<String>>,
	next_handle: AtomicU64,
}

impl Default for SessionRegistry {
	fn default() -> Self {
		SessionRegistry::new()
	}
}

impl SessionRegistry {
	pub fn new() -> Self {
		SessionRegistry {
			sessions: Mutex::new(HashMap::new()),
			truncated: Mutex::new(HashSet::new()),
			next_handle: AtomicU64::new(1),
		}
	}

	/// Register an open cache file; returns its handle
	pub fn insert(&self, remote_path: &str, local_path: PathBuf, file: File, dirty: bool) -> u64 {
		let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
		let session = Session {
			remote_path: remote_path.to_string(),
			local_path,
			file: Arc::new(file),
			dirty,
			truncated_since_open: false,
		};
		self.sessions.lock().insert(handle, session);
		handle
	}

	pub fn file(&self, handle: u64) -> Option<Arc<File>> {
		self.sessions.lock().get(&handle).map(|s| Arc::clone(&s.file))
	}

	pub fn contains(&self, handle: u64) -> bool {
		self.sessions.lock().contains_key(&handle)
	}

	pub fn open_count(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Record a local write; false if the handle is unknown
	pub fn mark_dirty(&self, handle: u64) -> bool {
		match self.sessions.lock().get_mut(&handle) {
			Some(session) => {
				session.dirty = true;
				true
			}
			None => false,
		}
	}

	pub fn is_dirty(&self, handle: u64) -> bool {
		self.sessions.lock().get(&handle).map(|s| s.dirty).unwrap_or(false)
	}

	pub fn is_truncated_since_open(&self, handle: u64) -> bool {
		self.sessions.lock().get(&handle).map(|s| s.truncated_since_open).unwrap_or(false)
	}

	/// Clear the dirty bit and hand back what must be pushed
	///
	/// `None` for clean or unknown handles, so a second flush is a no-op.
	pub fn take_dirty(&self, handle: u64) -> Option<PendingPush> {
		let mut sessions = self.sessions.lock();
		let session = sessions.get_mut(&handle)?;
		if !session.dirty {
			return None;
		}
		session.dirty = false;
		Some(PendingPush {
			handle,
			remote_path: session.remote_path.clone(),
			local_path: session.local_path.clone(),
		})
	}

	pub fn remove(&self, handle: u64) -> Option<Session> {
		self.sessions.lock().remove(&handle)
	}

	/// Handles holding unpushed writes, in ascending order
	pub fn pending_writes(&self) -> Vec<u64> {
		let mut handles: Vec<u64> =
			self.sessions.lock().iter().filter(|(_, s)| s.dirty).map(|(h, _)| *h).collect();
		handles.sort_unstable();
		handles
	}

	/// Some open session on `remote_path` holds unpushed writes
	pub fn has_dirty_session(&self, remote_path: &str) -> bool {
		self.sessions.lock().values().any(|s| s.dirty && s.remote_path == remote_path)
	}

	/// Flag every session on `remote_path` as truncated since open
	///
	/// Dirty bits are left alone; the truncate pushes the cut file itself.
	pub fn mark_truncated_sessions(&self, remote_path: &str) -> usize {
		let mut count = 0;
		for session in self.sessions.lock().values_mut() {
			if session.remote_path == remote_path {
				session.truncated_since_open = true;
				count += 1;
			}
		}
		count
	}

	pub fn set_truncated(&self, remote_path: &str) {
		self.truncated.lock().insert(remote_path.to_string());
	}

	pub fn is_truncated(&self, remote_path: &str) -> bool {
		self.truncated.lock().contains(remote_path)
	}

	/// Consume the truncated flag; true if it was set
	pub fn take_truncated(&self, remote_path: &str) -> bool {
		self.truncated.lock().remove(remote_path)
	}

	pub fn clear_truncated(&self, remote_path: &str) {
		self.truncated.lock().remove(remote_path);
	}

	/// Follow a remote rename: open sessions and the truncated flag move along
	pub fn rename(&self, from: &str, to: &str) {
		for session in self.sessions.lock().values_mut() {
			if session.remote_path == from {
				session.remote_path = to.to_string();
			}
		}
		let mut truncated = self.truncated.lock();
		if truncated.remove(from) {
			truncated.insert(to.to_string());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn open_temp(dir: &TempDir, name: &str) -> (PathBuf, File) {
		let path = dir.path().join(name);
		let file = File::create(&path).unwrap();
		(path, file)
	}

	#[test]
	fn test_handles_are_unique() {
		let dir = TempDir::new().unwrap();
		let registry = SessionRegistry::new();
		let (p1, f1) = open_temp(&dir, "a");
		let (p2, f2) = open_temp(&dir, "b");
		let h1 = registry.insert("/a", p1, f1, false);
		let h2 = registry.insert("/b", p2, f2, false);
		assert_ne!(h1, h2);
		assert_eq!(registry.open_count(), 2);
	}

	#[test]
	fn test_take_dirty_once() {
		let dir = TempDir::new().unwrap();
		let registry = SessionRegistry::new();
		let (path, file) = open_temp(&dir, "a");
		let handle = registry.insert("/sdcard/a", path.clone(), file, false);

		assert_eq!(registry.take_dirty(handle), None);
		assert!(registry.mark_dirty(handle));
		assert_eq!(registry.pending_writes(), vec![handle]);

		let push = registry.take_dirty(handle).unwrap();
		assert_eq!(push.remote_path, "/sdcard/a");
		assert_eq!(push.local_path, path);
		assert_eq!(registry.take_dirty(handle), None);
		assert!(registry.pending_writes().is_empty());
	}

	#[test]
	fn test_unknown_handle() {
		let registry = SessionRegistry::new();
		assert!(!registry.mark_dirty(42));
		assert!(registry.file(42).is_none());
		assert!(registry.remove(42).is_none());
	}

	#[test]
	fn test_truncate_marks_open_sessions() {
		let dir = TempDir::new().unwrap();
		let registry = SessionRegistry::new();
		let (p1, f1) = open_temp(&dir, "a");
		let (p2, f2) = open_temp(&dir, "b");
		let on_path = registry.insert("/a", p1, f1, false);
		let other = registry.insert("/b", p2, f2, false);

		assert_eq!(registry.mark_truncated_sessions("/a"), 1);
		assert!(registry.is_truncated_since_open(on_path));
		assert!(!registry.is_truncated_since_open(other));
		assert!(!registry.is_dirty(on_path), "a truncate is not a pending write");
		assert!(!registry.has_dirty_session("/a"));
	}

	#[test]
	fn test_truncated_flag_consumed_once() {
		let registry = SessionRegistry::new();
		registry.set_truncated("/a");
		assert!(registry.is_truncated("/a"));
		assert!(registry.take_truncated("/a"));
		assert!(!registry.take_truncated("/a"));
	}

	#[test]
	fn test_rename_rekeys() {
		let dir = TempDir::new().unwrap();
		let registry = SessionRegistry::new();
		let (path, file) = open_temp(&dir, "a");
		let handle = registry.insert("/old", path, file, true);
		registry.set_truncated("/old");

		registry.rename("/old", "/new");
		assert_eq!(registry.take_dirty(handle).unwrap().remote_path, "/new");
		assert!(registry.is_truncated("/new"));
		assert!(!registry.is_truncated("/old"));
	}
}

// vim: ts=4
