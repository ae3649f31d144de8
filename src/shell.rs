//! Shell command channel
//!
//! Remote mutations (mkdir, mv, rm, touch, sync) have no sync protocol
//! message, so they run as `adb shell <prefix> <command>`. Every command line
//! goes through a local `sh -c`, which is why escaping depends on where the
//! command finally runs.

use async_trait::async_trait;
use std::borrow::Cow;
use std::process::Stdio;
use tracing::debug;

use crate::config::AdbConfig;
use crate::error::ShellError;

/// Where an escaped command is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellTarget {
	/// Directly by the local `sh`
	Local,
	/// On the device, after passing through the local `sh` and `adb shell`
	Remote,
}

const LOCAL_SPECIALS: &[char] = &['\\', '\'', '`'];

const REMOTE_SPECIALS: &[char] =
	&['\\', '(', ')', '\'', '`', '|', '&', ';', '<', '>', '*', '#', '%', '=', '~'];

/// Colour sequences some device `ls` builds emit even when asked not to
const ANSI_COLOURS: &[&str] = &["\x1b[0;0m", "\x1b[1;32m", "\x1b[1;34m", "\x1b[1;36m"];

impl ShellTarget {
	fn specials(self) -> &'static [char] {
		match self {
			ShellTarget::Local => LOCAL_SPECIALS,
			ShellTarget::Remote => REMOTE_SPECIALS,
		}
	}
}

/// Remove the known ANSI colour sequences
pub fn strip_colours(text: &str) -> Cow<'_, str> {
	if !text.contains('\x1b') {
		return Cow::Borrowed(text);
	}
	let mut out = text.to_string();
	for seq in ANSI_COLOURS {
		out = out.replace(seq, "");
	}
	Cow::Owned(out)
}

/// Backslash-escape every character special to `target`
///
/// Colour sequences are stripped from remote commands before escaping, as
/// their `;` would otherwise be escaped first.
pub fn escape(command: &str, target: ShellTarget) -> String {
	let source = match target {
		ShellTarget::Remote => strip_colours(command),
		ShellTarget::Local => Cow::Borrowed(command),
	};
	let specials = target.specials();

	let mut out = String::with_capacity(source.len() + 8);
	for c in source.chars() {
		if specials.contains(&c) {
			out.push('\\');
		}
		out.push(c);
	}
	out
}

/// Exit status and stdout lines of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellOutput {
	/// Exit code; `None` if the command was killed by a signal
	pub code: Option<i32>,
	pub lines: Vec<String>,
}

impl ShellOutput {
	pub fn success(&self) -> bool {
		self.code == Some(0)
	}

	pub fn first_line(&self) -> Option<&str> {
		self.lines.first().map(String::as_str)
	}
}

#[async_trait]
pub trait ShellExecutor: Send + Sync {
	/// Escape `command` for `target` and run it to completion
	async fn run(&self, target: ShellTarget, command: &str) -> Result<ShellOutput, ShellError>;
}

/// Runs commands through the local shell and the `adb` binary
#[derive(Debug, Clone)]
pub struct AdbShell {
	adb_binary: String,
	serial: Option<String>,
	prefix: String,
}

impl AdbShell {
	pub fn new(settings: &AdbConfig) -> Self {
		AdbShell {
			adb_binary: settings.adb_binary.clone(),
			serial: settings.serial.clone(),
			prefix: settings.shell_prefix.clone(),
		}
	}

	/// Full line handed to `sh -c`
	pub fn command_line(&self, target: ShellTarget, command: &str) -> String {
		let escaped = escape(command, target);
		if target == ShellTarget::Local {
			return escaped;
		}

		let mut line = self.adb_binary.clone();
		if let Some(serial) = &self.serial {
			line.push_str(" -s ");
			line.push_str(serial);
		}
		line.push_str(" shell ");
		if !self.prefix.is_empty() {
			line.push_str(&self.prefix);
			line.push(' ');
		}
		line.push_str(&escaped);
		line
	}
}

#[async_trait]
impl ShellExecutor for AdbShell {
	async fn run(&self, target: ShellTarget, command: &str) -> Result<ShellOutput, ShellError> {
		let line = self.command_line(target, command);
		debug!("shell: {}", line);

		let output = tokio::process::Command::new("sh")
			.arg("-c")
			.arg(&line)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|source| ShellError::SpawnFailed { command: line.clone(), source })?;

		if !output.stderr.is_empty() {
			debug!("shell stderr: {}", String::from_utf8_lossy(&output.stderr).trim_end());
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		let lines = stdout
			.lines()
			.map(|l| strip_colours(l.trim_end_matches('\r')).into_owned())
			.collect();
		Ok(ShellOutput { code: output.status.code(), lines })
	}
}


// vim: ts=4
