//! Test doubles shared by the integration tests
//!
//! - `FakeAdbServer`: a loopback ADB server speaking the host and sync
//!   protocols over an in-memory device
//! - `MockDevice`: an in-process `DeviceSync` that counts pulls and pushes
//! - `MockShell`: a `ShellExecutor` that records commands

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use adbfs::config::AdbConfig;
use adbfs::error::{ConnectionError, ShellError};
use adbfs::protocol::{DeviceSync, DirEntry, DirListing, ProtocolError, ProtocolResult, StatResult};
use adbfs::shell::{ShellExecutor, ShellOutput, ShellTarget};

pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

// ============================================================================
// Fake ADB server
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakeFile {
	pub mode: u32,
	pub mtime: u32,
	pub data: Vec<u8>,
}

/// One completed SEND
#[derive(Debug, Clone)]
pub struct ReceivedPush {
	pub path: String,
	pub mode: u32,
	pub mtime: u32,
	pub data: Vec<u8>,
	pub largest_frame: usize,
}

#[derive(Debug, Default)]
pub struct FakeState {
	pub files: HashMap<String, FakeFile>,
	pub dirs: HashMap<String, Vec<(String, StatResult)>>,
	/// Serials `host:transport:<serial>` accepts
	pub serials: Vec<String>,
	/// Answer every SEND with FAIL
	pub reject_push: bool,
	/// Host service requests, in arrival order
	pub host_requests: Vec<String>,
	pub pushes: Vec<ReceivedPush>,
	pub quits: usize,
}

impl FakeState {
	pub fn with_file(mut self, path: &str, mode: u32, mtime: u32, data: &[u8]) -> Self {
		self.files.insert(path.to_string(), FakeFile { mode, mtime, data: data.to_vec() });
		self
	}

	pub fn with_dir(mut self, path: &str, entries: &[(&str, StatResult)]) -> Self {
		let entries = entries.iter().map(|(name, stat)| (name.to_string(), *stat)).collect();
		self.dirs.insert(path.to_string(), entries);
		self
	}
}

pub struct FakeAdbServer {
	pub addr: SocketAddr,
	pub state: Arc<Mutex<FakeState>>,
}

impl FakeAdbServer {
	pub async fn start(state: FakeState) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let state = Arc::new(Mutex::new(state));

		let shared = Arc::clone(&state);
		tokio::spawn(async move {
			while let Ok((sock, _)) = listener.accept().await {
				let state = Arc::clone(&shared);
				tokio::spawn(async move {
					let _ = serve_connection(sock, state).await;
				});
			}
		});

		FakeAdbServer { addr, state }
	}

	pub fn config(&self) -> AdbConfig {
		AdbConfig {
			server_host: self.addr.ip().to_string(),
			server_port: self.addr.port(),
			io_timeout_secs: 5,
			..AdbConfig::default()
		}
	}
}

async fn write_fail(sock: &mut TcpStream, message: &str) -> io::Result<()> {
	sock.write_all(format!("FAIL{:04x}{}", message.len(), message).as_bytes()).await
}

async fn read_sync_fail(sock: &mut TcpStream, message: &str) -> io::Result<()> {
	let mut frame = b"FAIL".to_vec();
	frame.extend_from_slice(&(message.len() as u32).to_le_bytes());
	frame.extend_from_slice(message.as_bytes());
	sock.write_all(&frame).await
}

async fn read_string(sock: &mut TcpStream, len: usize) -> io::Result<String> {
	let mut buf = vec![0u8; len];
	sock.read_exact(&mut buf).await?;
	Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn serve_connection(mut sock: TcpStream, state: Arc<Mutex<FakeState>>) -> io::Result<()> {
	// Host services until the socket switches to sync mode
	loop {
		let mut len = [0u8; 4];
		sock.read_exact(&mut len).await?;
		let len = usize::from_str_radix(std::str::from_utf8(&len).unwrap_or("0"), 16).unwrap_or(0);
		let service = read_string(&mut sock, len).await?;
		state.lock().host_requests.push(service.clone());

		if service == "sync:" {
			sock.write_all(b"OKAY").await?;
			break;
		}
		let accepted = match service.strip_prefix("host:transport:") {
			Some(serial) => state.lock().serials.iter().any(|s| s == serial),
			None => service == "host:transport-any",
		};
		if accepted {
			sock.write_all(b"OKAY").await?;
		} else {
			return write_fail(&mut sock, "device not found").await;
		}
	}

	loop {
		let mut header = [0u8; 8];
		if sock.read_exact(&mut header).await.is_err() {
			return Ok(());
		}
		let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

		match &header[..4] {
			b"QUIT" => {
				state.lock().quits += 1;
				return Ok(());
			}
			b"STAT" => {
				let path = read_string(&mut sock, len).await?;
				let (mode, size, mtime) = {
					let state = state.lock();
					match state.files.get(&path) {
						Some(f) => (f.mode, f.data.len() as u32, f.mtime),
						None if state.dirs.contains_key(&path) => (S_IFDIR | 0o755, 4096, 1),
						None => (0, 0, 0),
					}
				};
				let mut reply = b"STAT".to_vec();
				for field in [mode, size, mtime] {
					reply.extend_from_slice(&field.to_le_bytes());
				}
				sock.write_all(&reply).await?;
			}
			b"LIST" => {
				let path = read_string(&mut sock, len).await?;
				let entries = state.lock().dirs.get(&path).cloned().unwrap_or_default();
				let mut reply = Vec::new();
				for (name, stat) in entries {
					reply.extend_from_slice(b"DENT");
					for field in [stat.mode, stat.size as u32, stat.mtime, name.len() as u32] {
						reply.extend_from_slice(&field.to_le_bytes());
					}
					reply.extend_from_slice(name.as_bytes());
				}
				reply.extend_from_slice(b"DONE");
				reply.extend_from_slice(&[0u8; 16]);
				sock.write_all(&reply).await?;
			}
			b"RECV" => {
				let path = read_string(&mut sock, len).await?;
				let file = state.lock().files.get(&path).cloned();
				match file {
					Some(file) => {
						for chunk in file.data.chunks(64 * 1024) {
							let mut frame = b"DATA".to_vec();
							frame.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
							frame.extend_from_slice(chunk);
							sock.write_all(&frame).await?;
						}
						sock.write_all(b"DONE\0\0\0\0").await?;
					}
					None => read_sync_fail(&mut sock, "No such file or directory").await?,
				}
			}
			b"SEND" => {
				let target = read_string(&mut sock, len).await?;
				let (path, mode) = match target.rsplit_once(',') {
					Some((path, mode)) => (path.to_string(), mode.parse().unwrap_or(0)),
					None => (target.clone(), 0),
				};

				let mut data = Vec::new();
				let mut largest_frame = 0;
				let mtime = loop {
					let mut frame = [0u8; 8];
					sock.read_exact(&mut frame).await?;
					let n = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
					match &frame[..4] {
						b"DATA" => {
							let mut chunk = vec![0u8; n as usize];
							sock.read_exact(&mut chunk).await?;
							largest_frame = largest_frame.max(chunk.len());
							data.extend_from_slice(&chunk);
						}
						b"DONE" => break n,
						_ => return Ok(()),
					}
				};

				let reject = state.lock().reject_push;
				if reject {
					read_sync_fail(&mut sock, "Read-only file system").await?;
					continue;
				}

				{
					let mut state = state.lock();
					state.files.insert(path.clone(), FakeFile { mode, mtime, data: data.clone() });
					state.pushes.push(ReceivedPush { path, mode, mtime, data, largest_frame });
				}
				sock.write_all(b"OKAY\0\0\0\0").await?;
			}
			_ => return Ok(()),
		}
	}
}

// ============================================================================
// In-process device
// ============================================================================

#[derive(Default)]
pub struct MockDevice {
	pub files: Mutex<HashMap<String, (u32, u32, Vec<u8>)>>,
	pub dirs: Mutex<HashMap<String, Vec<DirEntry>>>,
	/// Paths whose listing fails mid-way
	pub broken_dirs: Mutex<Vec<String>>,
	pub fail_push: Mutex<bool>,
	pub stats: Mutex<Vec<String>>,
	pub pulls: Mutex<Vec<String>>,
	pub pushes: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockDevice {
	pub fn new() -> Arc<Self> {
		Arc::new(MockDevice::default())
	}

	pub fn add_file(&self, path: &str, mode: u32, mtime: u32, data: &[u8]) {
		self.files.lock().insert(path.to_string(), (mode, mtime, data.to_vec()));
	}

	pub fn add_dir(&self, path: &str, entries: Vec<DirEntry>) {
		self.dirs.lock().insert(path.to_string(), entries);
	}

	pub fn pull_count(&self) -> usize {
		self.pulls.lock().len()
	}

	pub fn push_count(&self) -> usize {
		self.pushes.lock().len()
	}
}

#[async_trait]
impl DeviceSync for MockDevice {
	async fn stat(&self, path: &str) -> ProtocolResult<StatResult> {
		self.stats.lock().push(path.to_string());
		if let Some((mode, mtime, data)) = self.files.lock().get(path) {
			return Ok(StatResult::new(*mode, data.len() as u64, *mtime));
		}
		if self.dirs.lock().contains_key(path) {
			return Ok(StatResult::new(S_IFDIR | 0o771, 4096, 1));
		}
		Err(ProtocolError::NotFound { path: path.to_string() })
	}

	async fn list(&self, path: &str) -> ProtocolResult<DirListing> {
		if self.broken_dirs.lock().iter().any(|p| p == path) {
			let items = vec![Err(ProtocolError::Connection(ConnectionError::Disconnected))];
			return Ok(stream::iter(items).boxed());
		}
		let entries = self.dirs.lock().get(path).cloned().unwrap_or_default();
		Ok(stream::iter(entries.into_iter().map(Ok)).boxed())
	}

	async fn pull(&self, remote: &str, local: &Path) -> ProtocolResult<()> {
		let data = match self.files.lock().get(remote) {
			Some((_, _, data)) => data.clone(),
			None => return Err(ProtocolError::Remote("No such file or directory".to_string())),
		};
		std::fs::write(local, data)?;
		self.pulls.lock().push(remote.to_string());
		Ok(())
	}

	async fn push(&self, local: &Path, remote: &str) -> ProtocolResult<()> {
		let data = std::fs::read(local)?;
		self.pushes.lock().push((remote.to_string(), data.clone()));
		if *self.fail_push.lock() {
			return Err(ProtocolError::Remote("Read-only file system".to_string()));
		}
		let mut files = self.files.lock();
		let entry = files.entry(remote.to_string()).or_insert((S_IFREG | 0o644, 0, Vec::new()));
		entry.2 = data;
		Ok(())
	}
}

// ============================================================================
// Recording shell
// ============================================================================

#[derive(Default)]
pub struct MockShell {
	pub commands: Mutex<Vec<(ShellTarget, String)>>,
	/// Canned output by exact command
	pub outputs: Mutex<HashMap<String, ShellOutput>>,
}

impl MockShell {
	pub fn new() -> Arc<Self> {
		Arc::new(MockShell::default())
	}

	pub fn respond(&self, command: &str, code: i32, lines: &[&str]) {
		let output =
			ShellOutput { code: Some(code), lines: lines.iter().map(|l| l.to_string()).collect() };
		self.outputs.lock().insert(command.to_string(), output);
	}

	pub fn remote_commands(&self) -> Vec<String> {
		self.commands
			.lock()
			.iter()
			.filter(|(target, _)| *target == ShellTarget::Remote)
			.map(|(_, command)| command.clone())
			.collect()
	}
}

#[async_trait]
impl ShellExecutor for MockShell {
	async fn run(&self, target: ShellTarget, command: &str) -> Result<ShellOutput, ShellError> {
		self.commands.lock().push((target, command.to_string()));
		let output = self.outputs.lock().get(command).cloned();
		Ok(output.unwrap_or(ShellOutput { code: Some(0), lines: Vec::new() }))
	}
}

// vim: ts=4
