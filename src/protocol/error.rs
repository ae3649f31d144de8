//! Protocol error types
//!
//! Errors raised while talking to the device's sync service, with
//! automatic conversions from the transport and local file layers.

use std::fmt;
use std::io;

use crate::error::ConnectionError;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// Transport could not be established or was lost
	Connection(ConnectionError),
	/// Well-formed reply saying the path does not exist
	NotFound { path: String },
	/// Reply carried an id other than the one the exchange expects
	UnexpectedId { expected: &'static str, got: [u8; 4] },
	/// Device answered FAIL with a message
	Remote(String),
	/// Request path longer than the service accepts
	PathTooLong { len: usize },
	/// DATA frame announced more bytes than a frame may carry
	FrameTooLarge { len: usize },
	/// Local file backing a pull or push failed
	LocalIo(io::Error),
}

impl ProtocolError {
	/// True for the absence conditions (all-zero stat, missing path)
	pub fn is_not_found(&self) -> bool {
		matches!(self, ProtocolError::NotFound { .. })
	}

	/// True when the round-trip deadline expired
	pub fn is_timeout(&self) -> bool {
		matches!(self, ProtocolError::Connection(ConnectionError::Timeout))
	}

	/// errno reported to the filesystem layer
	pub fn errno(&self) -> i32 {
		match self {
			ProtocolError::NotFound { .. } => libc::ENOENT,
			ProtocolError::Connection(ConnectionError::Timeout) => libc::EAGAIN,
			ProtocolError::PathTooLong { .. } => libc::ENAMETOOLONG,
			ProtocolError::LocalIo(e) => e.raw_os_error().unwrap_or(libc::EIO),
			_ => libc::EIO,
		}
	}
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Connection(e) => write!(f, "Connection error: {}", e),
			ProtocolError::NotFound { path } => write!(f, "No such remote path: {}", path),
			ProtocolError::UnexpectedId { expected, got } => {
				write!(f, "Expected {} reply, got {:?}", expected, String::from_utf8_lossy(got))
			}
			ProtocolError::Remote(msg) => write!(f, "Device reported failure: {}", msg),
			ProtocolError::PathTooLong { len } => write!(f, "Remote path too long: {} bytes", len),
			ProtocolError::FrameTooLarge { len } => {
				write!(f, "Data frame of {} bytes exceeds the frame limit", len)
			}
			ProtocolError::LocalIo(e) => write!(f, "Local file error: {}", e),
		}
	}
}

impl std::error::Error for ProtocolError {}

impl From<ConnectionError> for ProtocolError {
	fn from(e: ConnectionError) -> Self {
		ProtocolError::Connection(e)
	}
}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::LocalIo(e)
	}
}


// vim: ts=4
