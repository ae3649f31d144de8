//! Error types for adbfs operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::protocol::ProtocolError;

/// Transport-level errors talking to the ADB server
#[derive(Debug)]
pub enum ConnectionError {
	/// TCP connection to the ADB server failed
	ConnectFailed { addr: String, source: io::Error },

	/// ADB server answered FAIL to a host service request
	HostRejected { request: String, message: String },

	/// Peer closed the stream before the exchange finished
	Disconnected,

	/// Round-trip exceeded the configured deadline
	Timeout,

	/// Other I/O failure on the socket
	Io(io::Error),
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::ConnectFailed { addr, source } => {
				write!(f, "Cannot reach ADB server at {}: {}", addr, source)
			}
			ConnectionError::HostRejected { request, message } => {
				write!(f, "ADB server rejected '{}': {}", request, message)
			}
			ConnectionError::Disconnected => write!(f, "Connection disconnected"),
			ConnectionError::Timeout => write!(f, "Connection timeout"),
			ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
	fn from(e: io::Error) -> Self {
		ConnectionError::Io(e)
	}
}

/// Failures of the shell channel itself (not of the command it runs)
#[derive(Debug)]
pub enum ShellError {
	/// The local shell could not be started
	SpawnFailed { command: String, source: io::Error },
}

impl fmt::Display for ShellError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ShellError::SpawnFailed { command, source } => {
				write!(f, "Failed to spawn '{}': {}", command, source)
			}
		}
	}
}

impl Error for ShellError {}

/// Errors surfaced by the bridge to the filesystem layer
#[derive(Debug)]
pub enum BridgeError {
	/// Path is absent or unreachable on the device
	NotFound { path: String },

	/// Sync protocol failure
	Protocol(ProtocolError),

	/// Shell channel failure
	Shell(ShellError),

	/// Remote command ran but reported failure
	ShellFailed { command: String, code: Option<i32> },

	/// Local cache file operation failed
	LocalIo(io::Error),

	/// No open session under this handle
	BadHandle(u64),

	/// readlink target could not be determined
	InvalidLink { path: String },

	/// Operation not supported for this node type
	Unsupported { what: String },
}

impl BridgeError {
	/// POSIX errno for the filesystem layer
	pub fn errno(&self) -> i32 {
		match self {
			BridgeError::NotFound { .. } => libc::ENOENT,
			BridgeError::Protocol(e) => e.errno(),
			BridgeError::Shell(_) | BridgeError::ShellFailed { .. } => libc::EIO,
			BridgeError::LocalIo(e) => e.raw_os_error().unwrap_or(libc::EIO),
			BridgeError::BadHandle(_) => libc::EBADF,
			BridgeError::InvalidLink { .. } => libc::EINVAL,
			BridgeError::Unsupported { .. } => libc::EPERM,
		}
	}
}

impl fmt::Display for BridgeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BridgeError::NotFound { path } => write!(f, "Not found: {}", path),
			BridgeError::Protocol(e) => write!(f, "Protocol error: {}", e),
			BridgeError::Shell(e) => write!(f, "Shell error: {}", e),
			BridgeError::ShellFailed { command, code } => match code {
				Some(code) => write!(f, "Remote command '{}' exited with {}", command, code),
				None => write!(f, "Remote command '{}' was terminated", command),
			},
			BridgeError::LocalIo(e) => write!(f, "Local cache I/O error: {}", e),
			BridgeError::BadHandle(fh) => write!(f, "Unknown file handle {}", fh),
			BridgeError::InvalidLink { path } => write!(f, "Not a readable symlink: {}", path),
			BridgeError::Unsupported { what } => write!(f, "Unsupported: {}", what),
		}
	}
}

impl Error for BridgeError {}

impl From<io::Error> for BridgeError {
	fn from(e: io::Error) -> Self {
		BridgeError::LocalIo(e)
	}
}

impl From<ProtocolError> for BridgeError {
	fn from(e: ProtocolError) -> Self {
		BridgeError::Protocol(e)
	}
}

impl From<ShellError> for BridgeError {
	fn from(e: ShellError) -> Self {
		BridgeError::Shell(e)
	}
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Io { path: PathBuf, source: io::Error },

	/// Config file did not parse
	Parse { path: PathBuf, message: String },

	/// A setting holds a value outside its domain
	InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Io { path, source } => {
				write!(f, "Cannot read config {}: {}", path.display(), source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Invalid config {}: {}", path.display(), message)
			}
			ConfigError::InvalidValue { key, value } => {
				write!(f, "Invalid value for {}: {:?}", key, value)
			}
		}
	}
}

impl Error for ConfigError {}


// vim: ts=4
