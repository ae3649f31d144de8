//! Byte transfer primitives over the ADB server socket
//!
//! Both directions loop until the whole buffer has moved. `Interrupted` is
//! retried in place; a zero-length read, any other error, or an expired
//! deadline ends the exchange.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::error::ConnectionError;

use super::wire;

pub struct Transport<S> {
	stream: S,
	io_timeout: Duration,
}

impl<S> Transport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	pub fn new(stream: S, io_timeout: Duration) -> Self {
		Transport { stream, io_timeout }
	}

	/// Fill `buf` completely
	pub async fn read_full(&mut self, buf: &mut [u8]) -> Result<(), ConnectionError> {
		let mut filled = 0;
		while filled < buf.len() {
			match timeout(self.io_timeout, self.stream.read(&mut buf[filled..])).await {
				Err(_) => return Err(ConnectionError::Timeout),
				Ok(Ok(0)) => return Err(ConnectionError::Disconnected),
				Ok(Ok(n)) => filled += n,
				Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
				Ok(Err(e)) => return Err(ConnectionError::Io(e)),
			}
		}
		Ok(())
	}

	/// Write all of `buf`
	pub async fn write_full(&mut self, buf: &[u8]) -> Result<(), ConnectionError> {
		let mut written = 0;
		while written < buf.len() {
			match timeout(self.io_timeout, self.stream.write(&buf[written..])).await {
				Err(_) => return Err(ConnectionError::Timeout),
				Ok(Ok(0)) => return Err(ConnectionError::Disconnected),
				Ok(Ok(n)) => written += n,
				Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
				Ok(Err(e)) => return Err(ConnectionError::Io(e)),
			}
		}
		match timeout(self.io_timeout, self.stream.flush()).await {
			Err(_) => Err(ConnectionError::Timeout),
			Ok(result) => result.map_err(ConnectionError::Io),
		}
	}

	/// Read a byte array of fixed size
	pub async fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ConnectionError> {
		let mut buf = [0u8; N];
		self.read_full(&mut buf).await?;
		Ok(buf)
	}

	/// Read `len` bytes into a fresh buffer
	pub async fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, ConnectionError> {
		let mut buf = vec![0u8; len];
		self.read_full(&mut buf).await?;
		Ok(buf)
	}

	/// Send one host service request and wait for OKAY
	pub async fn host_request(&mut self, service: &str) -> Result<(), ConnectionError> {
		debug!("host request: {}", service);
		self.write_full(&wire::encode_host_request(service)).await?;
		let status: [u8; 4] = self.read_array().await?;
		if status == wire::ID_OKAY {
			return Ok(());
		}

		let message = if status == wire::ID_FAIL {
			let len_buf: [u8; 4] = self.read_array().await?;
			match wire::parse_hex_len(&len_buf) {
				Some(len) => String::from_utf8_lossy(&self.read_vec(len).await?).into_owned(),
				None => "malformed failure reply".to_string(),
			}
		} else {
			format!("unexpected status {:?}", String::from_utf8_lossy(&status))
		};
		Err(ConnectionError::HostRejected { request: service.to_string(), message })
	}
}


// vim: ts=4
