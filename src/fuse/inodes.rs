//! Inode numbers for remote paths
//!
//! The kernel addresses nodes by 64-bit inode; the device only knows paths.
//! Numbers are handed out on first sight and never reused. Root is 1.

use std::collections::HashMap;

pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
pub struct InodeTable {
	by_path: HashMap<String, u64>,
	by_inode: HashMap<u64, String>,
	next: u64,
}

impl Default for InodeTable {
	fn default() -> Self {
		InodeTable::new()
	}
}

impl InodeTable {
	pub fn new() -> Self {
		let mut table = InodeTable { by_path: HashMap::new(), by_inode: HashMap::new(), next: 2 };
		table.by_path.insert("/".to_string(), ROOT_INODE);
		table.by_inode.insert(ROOT_INODE, "/".to_string());
		table
	}

	pub fn path(&self, inode: u64) -> Option<&str> {
		self.by_inode.get(&inode).map(String::as_str)
	}

	pub fn inode(&self, path: &str) -> Option<u64> {
		self.by_path.get(path).copied()
	}

	pub fn get_or_create(&mut self, path: &str) -> u64 {
		if let Some(&inode) = self.by_path.get(path) {
			return inode;
		}
		let inode = self.next;
		self.next += 1;
		self.by_path.insert(path.to_string(), inode);
		self.by_inode.insert(inode, path.to_string());
		inode
	}

	/// Forget `path`; returns its inode if it had one
	pub fn remove_path(&mut self, path: &str) -> Option<u64> {
		let inode = self.by_path.remove(path)?;
		self.by_inode.remove(&inode);
		Some(inode)
	}

	/// Forget `path` and every node below it
	pub fn remove_subtree(&mut self, path: &str) {
		for (old, inode) in self.subtree(path) {
			self.by_path.remove(&old);
			self.by_inode.remove(&inode);
		}
	}

	fn subtree(&self, root: &str) -> Vec<(String, u64)> {
		let prefix = format!("{}/", root);
		self.by_path
			.iter()
			.filter(|(path, _)| path.as_str() == root || path.starts_with(&prefix))
			.map(|(path, inode)| (path.clone(), *inode))
			.collect()
	}

	/// Move `from` and everything below it to `to`
	///
	/// Whatever was known under `to`, descendants included, is dropped first.
	pub fn rename(&mut self, from: &str, to: &str) {
		if from == to {
			return;
		}
		self.remove_subtree(to);

		let moved = self.subtree(from);

		for (old, inode) in moved {
			let new = format!("{}{}", to, &old[from.len()..]);
			self.by_path.remove(&old);
			self.by_path.insert(new.clone(), inode);
			self.by_inode.insert(inode, new);
		}
	}

	/// Inode of the directory holding `path`; root is its own parent
	pub fn parent_inode(&self, path: &str) -> u64 {
		self.inode(&parent_path(path)).unwrap_or(ROOT_INODE)
	}
}

/// Remote path of `name` inside `parent`
pub fn child_path(parent: &str, name: &str) -> String {
	if parent == "/" {
		format!("/{}", name)
	} else {
		format!("{}/{}", parent, name)
	}
}

pub fn parent_path(path: &str) -> String {
	match path.rfind('/') {
		Some(0) | None => "/".to_string(),
		Some(pos) => path[..pos].to_string(),
	}
}


// vim: ts=4
