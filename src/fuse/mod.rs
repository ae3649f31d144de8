//! FUSE adapter
//!
//! Maps kernel callbacks onto [`Bridge`] operations. fuser calls in on its
//! own thread, so each callback drives the async bridge to completion on an
//! owned tokio runtime with `block_on`.

pub mod inodes;

use fuser::{
	FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
	ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config::MountConfig;
use crate::error::BridgeError;
use crate::protocol::{NodeKind, StatResult};
use crate::session::Bridge;

use inodes::{child_path, InodeTable, ROOT_INODE};

/// The device changes behind our back, so attributes are only briefly valid
const TTL: Duration = Duration::from_secs(1);

pub struct AdbFs {
	bridge: Arc<Bridge>,
	runtime: Runtime,
	inodes: InodeTable,
	uid: u32,
	gid: u32,
}

impl AdbFs {
	pub fn new(bridge: Arc<Bridge>, runtime: Runtime, uid: u32, gid: u32) -> Self {
		AdbFs { bridge, runtime, inodes: InodeTable::new(), uid, gid }
	}

	fn path(&self, ino: u64) -> Option<String> {
		self.inodes.path(ino).map(str::to_string)
	}

	fn child(&self, parent: u64, name: &OsStr) -> Option<String> {
		let parent = self.inodes.path(parent)?;
		Some(child_path(parent, name.to_str()?))
	}

	fn stat(&self, path: &str) -> Result<StatResult, BridgeError> {
		self.runtime.block_on(self.bridge.getattr(path))
	}

	/// Stat a freshly created or looked-up path and answer with an entry
	fn reply_entry(&mut self, path: &str, reply: ReplyEntry) {
		match self.stat(path) {
			Ok(stat) => {
				let ino = self.inodes.get_or_create(path);
				reply.entry(&TTL, &fillattr(ino, &stat, self.uid, self.gid), 0);
			}
			Err(e) => reply.error(errno(path, &e)),
		}
	}
}

fn errno(path: &str, e: &BridgeError) -> i32 {
	debug!("{}: {}", path, e);
	e.errno()
}

fn file_type(kind: NodeKind) -> FileType {
	match kind {
		NodeKind::File => FileType::RegularFile,
		NodeKind::Directory => FileType::Directory,
		NodeKind::SymLink => FileType::Symlink,
		NodeKind::CharDevice => FileType::CharDevice,
		NodeKind::BlockDevice => FileType::BlockDevice,
		NodeKind::Fifo => FileType::NamedPipe,
		NodeKind::Socket => FileType::Socket,
	}
}

/// Kernel attributes for a remote stat; ownership is the mounting user's
fn fillattr(ino: u64, stat: &StatResult, uid: u32, gid: u32) -> FileAttr {
	let mtime = UNIX_EPOCH + Duration::from_secs(stat.mtime as u64);
	let kind = file_type(stat.kind());
	FileAttr {
		ino,
		size: stat.size,
		blocks: stat.size.div_ceil(512),
		atime: mtime,
		mtime,
		ctime: mtime,
		crtime: mtime,
		kind,
		perm: stat.permissions(),
		nlink: if kind == FileType::Directory { 2 } else { 1 },
		uid,
		gid,
		rdev: 0,
		blksize: 512,
		flags: 0,
	}
}

impl Filesystem for AdbFs {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(path) = self.child(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};
		self.reply_entry(&path, reply);
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
		let Some(path) = self.path(ino) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.stat(&path) {
			Ok(stat) => reply.attr(&TTL, &fillattr(ino, &stat, self.uid, self.gid)),
			Err(e) => reply.error(errno(&path, &e)),
		}
	}

	/// Size changes truncate, time changes touch; mode and owner are ignored
	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_mode: Option<u32>,
		_uid: Option<u32>,
		_gid: Option<u32>,
		size: Option<u64>,
		atime: Option<TimeOrNow>,
		mtime: Option<TimeOrNow>,
		_ctime: Option<SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<SystemTime>,
		_chgtime: Option<SystemTime>,
		_bkuptime: Option<SystemTime>,
		_flags: Option<u32>,
		reply: ReplyAttr,
	) {
		let Some(path) = self.path(ino) else {
			reply.error(libc::ENOENT);
			return;
		};

		if let Some(size) = size {
			if let Err(e) = self.runtime.block_on(self.bridge.truncate(&path, size)) {
				reply.error(errno(&path, &e));
				return;
			}
		}
		if atime.is_some() || mtime.is_some() {
			if let Err(e) = self.runtime.block_on(self.bridge.utimens(&path)) {
				reply.error(errno(&path, &e));
				return;
			}
		}

		match self.stat(&path) {
			Ok(stat) => reply.attr(&TTL, &fillattr(ino, &stat, self.uid, self.gid)),
			Err(e) => reply.error(errno(&path, &e)),
		}
	}

	fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
		let Some(path) = self.path(ino) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.runtime.block_on(self.bridge.readlink(&path)) {
			Ok(target) => reply.data(target.as_bytes()),
			Err(e) => reply.error(errno(&path, &e)),
		}
	}

	fn mknod(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		umask: u32,
		_rdev: u32,
		reply: ReplyEntry,
	) {
		let Some(path) = self.child(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};
		if let Err(e) = self.runtime.block_on(self.bridge.mknod(&path, mode & !umask)) {
			reply.error(errno(&path, &e));
			return;
		}
		self.reply_entry(&path, reply);
	}

	fn mkdir(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		_mode: u32,
		_umask: u32,
		reply: ReplyEntry,
	) {
		let Some(path) = self.child(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};
		if let Err(e) = self.runtime.block_on(self.bridge.mkdir(&path)) {
			reply.error(errno(&path, &e));
			return;
		}
		self.reply_entry(&path, reply);
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(path) = self.child(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.runtime.block_on(self.bridge.unlink(&path)) {
			Ok(()) => {
				self.inodes.remove_path(&path);
				reply.ok();
			}
			Err(e) => reply.error(errno(&path, &e)),
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(path) = self.child(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.runtime.block_on(self.bridge.rmdir(&path)) {
			Ok(()) => {
				self.inodes.remove_subtree(&path);
				reply.ok();
			}
			Err(e) => reply.error(errno(&path, &e)),
		}
	}

	fn rename(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		newparent: u64,
		newname: &OsStr,
		_flags: u32,
		reply: ReplyEmpty,
	) {
		let (Some(from), Some(to)) = (self.child(parent, name), self.child(newparent, newname)) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.runtime.block_on(self.bridge.rename(&from, &to)) {
			Ok(()) => {
				self.inodes.rename(&from, &to);
				reply.ok();
			}
			Err(e) => reply.error(errno(&from, &e)),
		}
	}

	fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
		let Some(path) = self.path(ino) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.runtime.block_on(self.bridge.open(&path, flags)) {
			Ok(fh) => reply.opened(fh, 0),
			Err(e) => reply.error(errno(&path, &e)),
		}
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		if offset < 0 {
			reply.error(libc::EINVAL);
			return;
		}
		match self.bridge.read(fh, offset as u64, size as usize) {
			Ok(data) => reply.data(&data),
			Err(e) => reply.error(errno("read", &e)),
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		if offset < 0 {
			reply.error(libc::EINVAL);
			return;
		}
		match self.bridge.write(fh, offset as u64, data) {
			Ok(written) => reply.written(written as u32),
			Err(e) => reply.error(errno("write", &e)),
		}
	}

	fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
		match self.runtime.block_on(self.bridge.flush(fh)) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(errno("flush", &e)),
		}
	}

	fn release(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		fh: u64,
		_flags: i32,
		_lock_owner: Option<u64>,
		_flush: bool,
		reply: ReplyEmpty,
	) {
		match self.runtime.block_on(self.bridge.release(fh)) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(errno("release", &e)),
		}
	}

	/// `.` and `..` come from here; the device's own copies are skipped
	fn readdir(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		mut reply: ReplyDirectory,
	) {
		let Some(path) = self.path(ino) else {
			reply.error(libc::ENOENT);
			return;
		};
		let entries = match self.runtime.block_on(self.bridge.readdir(&path)) {
			Ok(entries) => entries,
			Err(e) => {
				reply.error(errno(&path, &e));
				return;
			}
		};

		let parent = if ino == ROOT_INODE { ROOT_INODE } else { self.inodes.parent_inode(&path) };
		let mut all = vec![
			(ino, FileType::Directory, ".".to_string()),
			(parent, FileType::Directory, "..".to_string()),
		];
		for entry in entries.into_iter().filter(|e| !e.is_dot()) {
			let child = self.inodes.get_or_create(&child_path(&path, &entry.name));
			all.push((child, file_type(entry.stat.kind()), entry.name));
		}

		for (i, (child, kind, name)) in all.iter().enumerate().skip(offset.max(0) as usize) {
			if reply.add(*child, (i + 1) as i64, *kind, name) {
				break;
			}
		}
		reply.ok();
	}

	fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
		let Some(path) = self.path(ino) else {
			reply.error(libc::ENOENT);
			return;
		};
		match self.bridge.access(&path, mask) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(errno(&path, &e)),
		}
	}
}

/// Mount options for the configured mount
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
	let mut options = vec![MountOption::FSName(config.fs_name.clone())];
	if config.auto_unmount {
		options.push(MountOption::AutoUnmount);
	}
	if config.allow_other {
		options.push(MountOption::AllowOther);
	}
	options
}

/// Serve `bridge` at `mountpoint` until the filesystem is unmounted
pub fn mount(
	bridge: Arc<Bridge>,
	runtime: Runtime,
	mountpoint: &Path,
	config: &MountConfig,
) -> io::Result<()> {
	let uid = unsafe { libc::getuid() };
	let gid = unsafe { libc::getgid() };

	let fs = AdbFs::new(bridge, runtime, uid, gid);
	info!("mounting at {}", mountpoint.display());
	fuser::mount2(fs, mountpoint, &mount_options(config))?;
	info!("unmounted {}", mountpoint.display());
	Ok(())
}


// vim: ts=4
