//! ADB sync service client
//!
//! `SyncConnection` speaks the sync protocol over any byte stream that has
//! already been switched to the `sync:` service. `AdbSync` owns the policy of
//! one fresh ADB server connection per operation.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::AdbConfig;
use crate::error::ConnectionError;

use super::error::ProtocolError;
use super::traits::{DeviceSync, DirListing, ProtocolResult};
use super::transport::Transport;
use super::types::*;
use super::wire::{self, DentHeader, FrameHeader, StatRecord};

/// A socket switched to the device's sync service
pub struct SyncConnection<S> {
	transport: Transport<S>,
}

impl<S> SyncConnection<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	/// Wrap a stream that is already in sync mode
	pub fn new(stream: S, io_timeout: Duration) -> Self {
		SyncConnection { transport: Transport::new(stream, io_timeout) }
	}

	/// Select the device transport, then enter the sync service
	pub async fn open(
		stream: S,
		serial: Option<&str>,
		io_timeout: Duration,
	) -> Result<Self, ConnectionError> {
		let mut transport = Transport::new(stream, io_timeout);
		let target = match serial {
			Some(serial) => format!("host:transport:{}", serial),
			None => "host:transport-any".to_string(),
		};
		transport.host_request(&target).await?;
		transport.host_request("sync:").await?;
		Ok(SyncConnection { transport })
	}

	async fn send_request(&mut self, id: [u8; 4], path: &str) -> ProtocolResult<()> {
		let buf = wire::encode_request(id, path.as_bytes())?;
		self.transport.write_full(&buf).await?;
		Ok(())
	}

	async fn read_header(&mut self) -> ProtocolResult<FrameHeader> {
		Ok(FrameHeader::decode(&self.transport.read_array().await?))
	}

	async fn read_failure(&mut self, len: u32) -> ProtocolResult<ProtocolError> {
		let len = len as usize;
		if len > wire::MAX_DATA_LEN {
			return Err(ProtocolError::FrameTooLarge { len });
		}
		let msg = self.transport.read_vec(len).await?;
		Ok(ProtocolError::Remote(String::from_utf8_lossy(&msg).into_owned()))
	}

	pub async fn stat(&mut self, path: &str) -> ProtocolResult<StatResult> {
		self.send_request(wire::ID_STAT, path).await?;
		let record = StatRecord::decode(&self.transport.read_array().await?);
		if record.id != wire::ID_STAT {
			debug!("stat {}: reply id {:?}", path, String::from_utf8_lossy(&record.id));
			return Err(ProtocolError::NotFound { path: path.to_string() });
		}

		let stat = record.to_stat();
		if stat.is_absent() {
			return Err(ProtocolError::NotFound { path: path.to_string() });
		}
		Ok(stat)
	}

	pub async fn begin_list(&mut self, path: &str) -> ProtocolResult<()> {
		self.send_request(wire::ID_LIST, path).await
	}

	/// Next listing record, `None` once the DONE record arrives
	pub async fn next_entry(&mut self) -> ProtocolResult<Option<DirEntry>> {
		let header = DentHeader::decode(&self.transport.read_array().await?);
		if header.id == wire::ID_DONE {
			return Ok(None);
		}
		if header.id != wire::ID_DENT {
			return Err(ProtocolError::UnexpectedId { expected: "DENT", got: header.id });
		}

		let namelen = header.namelen as usize;
		if namelen > wire::MAX_PATH_LEN {
			return Err(ProtocolError::FrameTooLarge { len: namelen });
		}
		let name = self.transport.read_vec(namelen).await?;
		Ok(Some(DirEntry { name: String::from_utf8_lossy(&name).into_owned(), stat: header.to_stat() }))
	}

	/// Download `remote` into `local`; returns the byte count
	pub async fn pull(&mut self, remote: &str, local: &Path) -> ProtocolResult<u64> {
		self.send_request(wire::ID_RECV, remote).await?;
		let mut file = tokio::fs::File::create(local).await?;
		let mut total = 0u64;

		loop {
			let header = self.read_header().await?;
			match header.id {
				wire::ID_DATA => {
					let len = header.len as usize;
					if len > wire::MAX_DATA_LEN {
						return Err(ProtocolError::FrameTooLarge { len });
					}
					let data = self.transport.read_vec(len).await?;
					file.write_all(&data).await?;
					total += len as u64;
				}
				wire::ID_DONE => break,
				wire::ID_FAIL => return Err(self.read_failure(header.len).await?),
				other => return Err(ProtocolError::UnexpectedId { expected: "DATA", got: other }),
			}
		}

		file.flush().await?;
		Ok(total)
	}

	/// Upload `local` to `remote`; returns the byte count
	pub async fn push(&mut self, local: &Path, remote: &str) -> ProtocolResult<u64> {
		let mut file = tokio::fs::File::open(local).await?;
		let meta = file.metadata().await?;
		self.send_request(wire::ID_SEND, &wire::send_target(remote, meta.mode())).await?;

		let mut buf = vec![0u8; wire::MAX_DATA_LEN];
		let mut total = 0u64;
		loop {
			let n = file.read(&mut buf).await?;
			if n == 0 {
				break;
			}
			self.transport.write_full(&FrameHeader::new(wire::ID_DATA, n as u32).encode()).await?;
			self.transport.write_full(&buf[..n]).await?;
			total += n as u64;
		}

		let done = FrameHeader::new(wire::ID_DONE, meta.mtime() as u32);
		self.transport.write_full(&done.encode()).await?;

		let reply = self.read_header().await?;
		match reply.id {
			wire::ID_OKAY => Ok(total),
			wire::ID_FAIL => Err(self.read_failure(reply.len).await?),
			other => Err(ProtocolError::UnexpectedId { expected: "OKAY", got: other }),
		}
	}

	/// End the session politely; the socket closes on drop either way
	pub async fn quit(mut self) -> ProtocolResult<()> {
		self.transport.write_full(&FrameHeader::new(wire::ID_QUIT, 0).encode()).await?;
		Ok(())
	}
}

impl<S> SyncConnection<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	/// Turn a connection with a LIST in flight into a lazy entry stream
	pub fn into_listing(self) -> DirListing {
		stream::unfold(Some(self), |state| async move {
			let mut conn = state?;
			match conn.next_entry().await {
				Ok(Some(entry)) => Some((Ok(entry), Some(conn))),
				Ok(None) => {
					close(conn).await;
					None
				}
				Err(e) => Some((Err(e), None)),
			}
		})
		.boxed()
	}
}

async fn close<S>(conn: SyncConnection<S>)
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	if let Err(e) = conn.quit().await {
		debug!("QUIT not delivered: {}", e);
	}
}

/// Sync client against a local ADB server
#[derive(Debug, Clone)]
pub struct AdbSync {
	addr: String,
	serial: Option<String>,
	io_timeout: Duration,
}

impl AdbSync {
	pub fn new(settings: &AdbConfig) -> Self {
		AdbSync {
			addr: settings.server_addr(),
			serial: settings.serial.clone(),
			io_timeout: settings.io_timeout(),
		}
	}

	/// Fresh connection to the device's sync service
	pub async fn connect(&self) -> Result<SyncConnection<TcpStream>, ConnectionError> {
		let stream = match timeout(self.io_timeout, TcpStream::connect(&self.addr)).await {
			Err(_) => return Err(ConnectionError::Timeout),
			Ok(Err(source)) => {
				return Err(ConnectionError::ConnectFailed { addr: self.addr.clone(), source })
			}
			Ok(Ok(stream)) => stream,
		};
		if let Err(e) = stream.set_nodelay(true) {
			debug!("TCP_NODELAY not set: {}", e);
		}
		SyncConnection::open(stream, self.serial.as_deref(), self.io_timeout).await
	}
}

#[async_trait]
impl DeviceSync for AdbSync {
	async fn stat(&self, path: &str) -> ProtocolResult<StatResult> {
		debug!("stat {}", path);
		let mut conn = self.connect().await?;
		let stat = conn.stat(path).await?;
		close(conn).await;
		Ok(stat)
	}

	async fn list(&self, path: &str) -> ProtocolResult<DirListing> {
		debug!("list {}", path);
		let mut conn = self.connect().await?;
		conn.begin_list(path).await?;
		Ok(conn.into_listing())
	}

	async fn pull(&self, remote: &str, local: &Path) -> ProtocolResult<()> {
		let mut conn = self.connect().await?;
		let bytes = conn.pull(remote, local).await?;
		close(conn).await;
		debug!("pulled {} ({} bytes) into {}", remote, bytes, local.display());
		Ok(())
	}

	async fn push(&self, local: &Path, remote: &str) -> ProtocolResult<()> {
		let mut conn = self.connect().await?;
		let bytes = conn.push(local, remote).await?;
		close(conn).await;
		debug!("pushed {} ({} bytes) to {}", local.display(), bytes, remote);
		Ok(())
	}
}


// vim: ts=4
