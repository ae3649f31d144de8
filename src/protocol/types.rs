//! Protocol-level value types shared by the sync client and the bridge

/// Result of a remote stat
///
/// The wire carries three 32-bit little-endian fields. An all-zero triple
/// is the device's way of saying "no such path" and never a real file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatResult {
	/// Permission and file-type bits
	pub mode: u32,
	/// Size in bytes
	pub size: u64,
	/// Modification time, seconds since the Unix epoch
	pub mtime: u32,
}

/// Kind of node, decoded from the `S_IFMT` bits of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	File,
	Directory,
	SymLink,
	CharDevice,
	BlockDevice,
	Fifo,
	Socket,
}

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

impl StatResult {
	pub fn new(mode: u32, size: u64, mtime: u32) -> Self {
		StatResult { mode, size, mtime }
	}

	/// The degenerate reply the device sends for missing paths
	pub fn is_absent(&self) -> bool {
		self.mode == 0 && self.size == 0 && self.mtime == 0
	}

	pub fn kind(&self) -> NodeKind {
		NodeKind::from_mode(self.mode)
	}

	/// Permission bits only
	pub fn permissions(&self) -> u16 {
		(self.mode & 0o7777) as u16
	}
}

impl NodeKind {
	pub fn from_mode(mode: u32) -> Self {
		match mode & S_IFMT {
			S_IFDIR => NodeKind::Directory,
			S_IFLNK => NodeKind::SymLink,
			S_IFCHR => NodeKind::CharDevice,
			S_IFBLK => NodeKind::BlockDevice,
			S_IFIFO => NodeKind::Fifo,
			S_IFSOCK => NodeKind::Socket,
			_ => NodeKind::File,
		}
	}

	/// True only for modes that explicitly carry the regular-file type
	pub fn is_regular_mode(mode: u32) -> bool {
		mode & S_IFMT == S_IFREG
	}
}

/// One record of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
	pub name: String,
	pub stat: StatResult,
}

impl DirEntry {
	/// The `.` and `..` records the device includes in every listing
	pub fn is_dot(&self) -> bool {
		self.name == "." || self.name == ".."
	}
}


// vim: ts=4
