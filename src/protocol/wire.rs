//! Sync service framing
//!
//! Every sync message starts with a four byte ASCII id. Requests carry a
//! 32-bit little-endian length followed by that many path bytes; replies are
//! fixed-size records (STAT, DENT) or `{id, len}` frame headers (DATA, DONE,
//! OKAY, FAIL). Host service requests use a separate text framing: four hex
//! digits of length, then the request.

use super::error::ProtocolError;
use super::types::StatResult;

pub const ID_STAT: [u8; 4] = *b"STAT";
pub const ID_LIST: [u8; 4] = *b"LIST";
pub const ID_DENT: [u8; 4] = *b"DENT";
pub const ID_DONE: [u8; 4] = *b"DONE";
pub const ID_RECV: [u8; 4] = *b"RECV";
pub const ID_SEND: [u8; 4] = *b"SEND";
pub const ID_DATA: [u8; 4] = *b"DATA";
pub const ID_OKAY: [u8; 4] = *b"OKAY";
pub const ID_FAIL: [u8; 4] = *b"FAIL";
pub const ID_QUIT: [u8; 4] = *b"QUIT";

/// Longest path the sync service accepts in a request
pub const MAX_PATH_LEN: usize = 1024;

/// Largest payload a single DATA frame may carry
pub const MAX_DATA_LEN: usize = 64 * 1024;

/// `{id, len}`
pub const FRAME_HEADER_LEN: usize = 8;

/// `{id, mode, size, mtime}`
pub const STAT_RECORD_LEN: usize = 16;

/// `{id, mode, size, mtime, namelen}`
pub const DENT_HEADER_LEN: usize = 20;

fn le_u32(buf: &[u8], at: usize) -> u32 {
	u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn tag(buf: &[u8]) -> [u8; 4] {
	[buf[0], buf[1], buf[2], buf[3]]
}

/// Encode a sync request: `{id, len}` followed by the raw path bytes
pub fn encode_request(id: [u8; 4], path: &[u8]) -> Result<Vec<u8>, ProtocolError> {
	if path.len() > MAX_PATH_LEN {
		return Err(ProtocolError::PathTooLong { len: path.len() });
	}
	let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + path.len());
	buf.extend_from_slice(&id);
	buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
	buf.extend_from_slice(path);
	Ok(buf)
}

/// `{id, len}` header used by DATA, DONE, OKAY, FAIL and QUIT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
	pub id: [u8; 4],
	pub len: u32,
}

impl FrameHeader {
	pub fn new(id: [u8; 4], len: u32) -> Self {
		FrameHeader { id, len }
	}

	pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
		let mut buf = [0u8; FRAME_HEADER_LEN];
		buf[..4].copy_from_slice(&self.id);
		buf[4..].copy_from_slice(&self.len.to_le_bytes());
		buf
	}

	pub fn decode(buf: &[u8; FRAME_HEADER_LEN]) -> Self {
		FrameHeader { id: tag(buf), len: le_u32(buf, 4) }
	}
}

/// Fixed-size STAT reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
	pub id: [u8; 4],
	pub mode: u32,
	pub size: u32,
	pub mtime: u32,
}

impl StatRecord {
	pub fn encode(&self) -> [u8; STAT_RECORD_LEN] {
		let mut buf = [0u8; STAT_RECORD_LEN];
		buf[..4].copy_from_slice(&self.id);
		buf[4..8].copy_from_slice(&self.mode.to_le_bytes());
		buf[8..12].copy_from_slice(&self.size.to_le_bytes());
		buf[12..16].copy_from_slice(&self.mtime.to_le_bytes());
		buf
	}

	pub fn decode(buf: &[u8; STAT_RECORD_LEN]) -> Self {
		StatRecord { id: tag(buf), mode: le_u32(buf, 4), size: le_u32(buf, 8), mtime: le_u32(buf, 12) }
	}

	pub fn to_stat(&self) -> StatResult {
		StatResult::new(self.mode, self.size as u64, self.mtime)
	}
}

/// Header of one LIST record; `namelen` name bytes follow unless id is DONE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DentHeader {
	pub id: [u8; 4],
	pub mode: u32,
	pub size: u32,
	pub mtime: u32,
	pub namelen: u32,
}

impl DentHeader {
	pub fn encode(&self) -> [u8; DENT_HEADER_LEN] {
		let mut buf = [0u8; DENT_HEADER_LEN];
		buf[..4].copy_from_slice(&self.id);
		buf[4..8].copy_from_slice(&self.mode.to_le_bytes());
		buf[8..12].copy_from_slice(&self.size.to_le_bytes());
		buf[12..16].copy_from_slice(&self.mtime.to_le_bytes());
		buf[16..20].copy_from_slice(&self.namelen.to_le_bytes());
		buf
	}

	pub fn decode(buf: &[u8; DENT_HEADER_LEN]) -> Self {
		DentHeader {
			id: tag(buf),
			mode: le_u32(buf, 4),
			size: le_u32(buf, 8),
			mtime: le_u32(buf, 12),
			namelen: le_u32(buf, 16),
		}
	}

	pub fn to_stat(&self) -> StatResult {
		StatResult::new(self.mode, self.size as u64, self.mtime)
	}
}

/// Frame a host service request (`host:transport-any`, `sync:`, ...)
pub fn encode_host_request(service: &str) -> Vec<u8> {
	format!("{:04x}{}", service.len(), service).into_bytes()
}

/// Parse the four hex digit length that precedes a host FAIL message
pub fn parse_hex_len(buf: &[u8; 4]) -> Option<usize> {
	std::str::from_utf8(buf).ok().and_then(|s| usize::from_str_radix(s, 16).ok())
}

/// Path argument of a SEND request: `"<remote>,<mode>"`
pub fn send_target(remote: &str, mode: u32) -> String {
	format!("{},{}", remote, mode)
}


// vim: ts=4
