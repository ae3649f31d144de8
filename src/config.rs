//! Configuration for adbfs
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (--config, or ~/.config/adbfs/config.toml if present)
//! 3. Environment variables (ADBFS_* prefix, plus ANDROID_SERIAL)
//! 4. CLI flags (highest priority, applied by the caller)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Directory holding local copies of remote files; wiped on every mount
	pub staging_dir: PathBuf,

	/// Report failed remote shell commands as EIO instead of only logging them
	pub strict_shell: bool,

	/// Default log level when RUST_LOG is not set
	pub log_level: String,

	/// ADB server and device selection
	pub adb: AdbConfig,

	/// FUSE mount options
	pub mount: MountConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			staging_dir: PathBuf::from("/tmp/adbfs"),
			strict_shell: false,
			log_level: "info".to_string(),
			adb: AdbConfig::default(),
			mount: MountConfig::default(),
		}
	}
}

// ============================================================================
// NESTED CONFIGURATION STRUCTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdbConfig {
	/// Host the ADB server listens on
	pub server_host: String,

	/// ADB server port
	pub server_port: u16,

	/// Device serial; `None` picks the only attached device
	pub serial: Option<String>,

	/// adb executable used for the shell channel
	pub adb_binary: String,

	/// Prefix put in front of every remote command (e.g. "busybox")
	pub shell_prefix: String,

	/// Deadline for each socket round-trip, in seconds
	pub io_timeout_secs: u64,
}

impl Default for AdbConfig {
	fn default() -> Self {
		AdbConfig {
			server_host: "127.0.0.1".to_string(),
			server_port: 5037,
			serial: None,
			adb_binary: "adb".to_string(),
			shell_prefix: "busybox".to_string(),
			io_timeout_secs: 30,
		}
	}
}

impl AdbConfig {
	pub fn server_addr(&self) -> String {
		format!("{}:{}", self.server_host, self.server_port)
	}

	pub fn io_timeout(&self) -> Duration {
		Duration::from_secs(self.io_timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MountConfig {
	/// Filesystem name shown in the mount table
	pub fs_name: String,

	/// Let other users access the mount (needs user_allow_other in fuse.conf)
	pub allow_other: bool,

	/// Unmount automatically when the process exits
	pub auto_unmount: bool,
}

impl Default for MountConfig {
	fn default() -> Self {
		MountConfig { fs_name: "adbfs".to_string(), allow_other: false, auto_unmount: true }
	}
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
	/// `$XDG_CONFIG_HOME/adbfs/config.toml`, falling back to `~/.config`
	pub fn default_path() -> Option<PathBuf> {
		if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
			return Some(PathBuf::from(config_home).join("adbfs").join("config.toml"));
		}
		std::env::var("HOME")
			.ok()
			.map(|home| PathBuf::from(home).join(".config").join("adbfs").join("config.toml"))
	}

	/// Parse a config file; `.json` files are JSON, everything else TOML
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

		let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);
		if is_json {
			serde_json::from_str(&contents)
				.map_err(|e| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })
		} else {
			toml::from_str(&contents)
				.map_err(|e| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })
		}
	}

	/// Defaults, then file, then environment
	///
	/// An explicit path must exist; the default path is only read when present.
	pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match explicit {
			Some(path) => Config::from_file(path)?,
			None => match Config::default_path() {
				Some(path) if path.is_file() => Config::from_file(&path)?,
				_ => Config::default(),
			},
		};
		config.apply_env_from(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	/// Overlay environment settings read through `lookup`
	pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(dir) = lookup("ADBFS_STAGING_DIR") {
			self.staging_dir = PathBuf::from(dir);
		}
		if let Some(serial) = lookup("ADBFS_SERIAL").or_else(|| lookup("ANDROID_SERIAL")) {
			self.adb.serial = Some(serial);
		}
		if let Some(host) = lookup("ADBFS_ADB_HOST") {
			self.adb.server_host = host;
		}
		if let Some(port) = lookup("ADBFS_ADB_PORT") {
			self.adb.server_port = parse_value("ADBFS_ADB_PORT", &port)?;
		}
		if let Some(binary) = lookup("ADBFS_ADB_BINARY") {
			self.adb.adb_binary = binary;
		}
		if let Some(prefix) = lookup("ADBFS_SHELL_PREFIX") {
			self.adb.shell_prefix = prefix;
		}
		if let Some(secs) = lookup("ADBFS_IO_TIMEOUT") {
			self.adb.io_timeout_secs = parse_value("ADBFS_IO_TIMEOUT", &secs)?;
		}
		if let Some(flag) = lookup("ADBFS_STRICT_SHELL") {
			self.strict_shell = parse_bool("ADBFS_STRICT_SHELL", &flag)?;
		}
		if let Some(flag) = lookup("ADBFS_ALLOW_OTHER") {
			self.mount.allow_other = parse_bool("ADBFS_ALLOW_OTHER", &flag)?;
		}
		if let Some(level) = lookup("ADBFS_LOG_LEVEL") {
			self.log_level = level;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.staging_dir.as_os_str().is_empty() || self.staging_dir == Path::new("/") {
			// reset() removes the directory recursively
			return Err(invalid("stagingDir", &self.staging_dir.display().to_string()));
		}
		if self.adb.server_port == 0 {
			return Err(invalid("adb.serverPort", "0"));
		}
		if self.adb.io_timeout_secs == 0 {
			return Err(invalid("adb.ioTimeoutSecs", "0"));
		}
		if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
			return Err(invalid("logLevel", &self.log_level));
		}
		Ok(())
	}
}

fn invalid(key: &str, value: &str) -> ConfigError {
	ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
	value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" | "" => Ok(false),
		_ => Err(invalid(key, value)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.staging_dir, PathBuf::from("/tmp/adbfs"));
		assert_eq!(config.adb.server_addr(), "127.0.0.1:5037");
		assert_eq!(config.adb.shell_prefix, "busybox");
		assert!(!config.strict_shell);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_from_toml_file() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		writeln!(
			file,
			"stagingDir = \"/var/tmp/adbfs\"\nstrictShell = true\n\n[adb]\nserial = \"emulator-5554\"\nioTimeoutSecs = 5\n"
		)
		.unwrap();

		let config = Config::from_file(file.path()).unwrap();
		assert_eq!(config.staging_dir, PathBuf::from("/var/tmp/adbfs"));
		assert!(config.strict_shell);
		assert_eq!(config.adb.serial.as_deref(), Some("emulator-5554"));
		assert_eq!(config.adb.io_timeout(), Duration::from_secs(5));
		// Unset fields keep their defaults
		assert_eq!(config.adb.server_port, 5037);
		assert!(config.mount.auto_unmount);
	}

	#[test]
	fn test_from_json_file() {
		let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
		write!(file, "{{\"mount\": {{\"allowOther\": true, \"fsName\": \"phone\"}}}}").unwrap();

		let config = Config::from_file(file.path()).unwrap();
		assert!(config.mount.allow_other);
		assert_eq!(config.mount.fs_name, "phone");
	}

	#[test]
	fn test_parse_error_names_file() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		write!(file, "stagingDir = [").unwrap();
		match Config::from_file(file.path()) {
			Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn test_env_overrides() {
		let env: HashMap<&str, &str> = [
			("ADBFS_ADB_PORT", "5555"),
			("ANDROID_SERIAL", "fallback"),
			("ADBFS_STRICT_SHELL", "yes"),
		]
		.into_iter()
		.collect();

		let mut config = Config::default();
		config.apply_env_from(|key| env.get(key).map(|v| v.to_string())).unwrap();
		assert_eq!(config.adb.server_port, 5555);
		assert_eq!(config.adb.serial.as_deref(), Some("fallback"));
		assert!(config.strict_shell);
	}

	#[test]
	fn test_adbfs_serial_beats_android_serial() {
		let mut config = Config::default();
		config
			.apply_env_from(|key| match key {
				"ADBFS_SERIAL" => Some("primary".to_string()),
				"ANDROID_SERIAL" => Some("fallback".to_string()),
				_ => None,
			})
			.unwrap();
		assert_eq!(config.adb.serial.as_deref(), Some("primary"));
	}

	#[test]
	fn test_bad_env_value() {
		let mut config = Config::default();
		let result = config.apply_env_from(|key| match key {
			"ADBFS_IO_TIMEOUT" => Some("soon".to_string()),
			_ => None,
		});
		assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
	}

	#[test]
	fn test_validate_rejects_root_staging_dir() {
		let config = Config { staging_dir: PathBuf::from("/"), ..Config::default() };
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_validate_rejects_unknown_log_level() {
		let config = Config { log_level: "loud".to_string(), ..Config::default() };
		assert!(config.validate().is_err());
	}
}

// vim: ts=4
