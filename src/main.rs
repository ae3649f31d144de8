use clap::{Arg, Command};
use futures::StreamExt;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use adbfs::logging::*;
use adbfs::protocol::{AdbSync, DeviceSync};
use adbfs::shell::AdbShell;
use adbfs::{Bridge, Config, StagingCache};

fn cli() -> Command {
	Command::new("adbfs")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Szilard Hajba <szilard@symbion.hu>")
		.about("Mount an Android device's filesystem over ADB")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Config file (TOML, or JSON with a .json extension)"),
		)
		.arg(
			Arg::new("serial")
				.short('s')
				.long("serial")
				.value_name("SERIAL")
				.help("Device serial (default: the only attached device)"),
		)
		.arg(
			Arg::new("log-level")
				.short('l')
				.long("log-level")
				.value_name("LEVEL")
				.help("trace, debug, info, warn or error"),
		)
		.subcommand(
			Command::new("mount")
				.about("Mount the device filesystem")
				.arg(Arg::new("mountpoint").required(true)),
		)
		.subcommand(
			Command::new("stat")
				.about("Show the remote stat of a path")
				.arg(Arg::new("path").required(true)),
		)
		.subcommand(
			Command::new("ls")
				.about("List a remote directory")
				.arg(Arg::new("path").required(true)),
		)
		.subcommand(
			Command::new("pull")
				.about("Download a remote file")
				.arg(Arg::new("remote").required(true))
				.arg(Arg::new("local").required(true)),
		)
		.subcommand(
			Command::new("push")
				.about("Upload a local file")
				.arg(Arg::new("local").required(true))
				.arg(Arg::new("remote").required(true)),
		)
}

fn mount(config: Config, runtime: tokio::runtime::Runtime, mountpoint: &Path) -> Result<(), Box<dyn Error>> {
	let cache = StagingCache::new(&config.staging_dir);
	cache.reset().map_err(|e| {
		format!("Cannot prepare staging directory {}: {}", config.staging_dir.display(), e)
	})?;
	info!("staging directory: {}", config.staging_dir.display());

	let bridge = Arc::new(Bridge::new(
		Arc::new(AdbSync::new(&config.adb)),
		Arc::new(AdbShell::new(&config.adb)),
		cache,
		config.strict_shell,
	));
	adbfs::fuse::mount(bridge, runtime, mountpoint, &config.mount)?;
	Ok(())
}

async fn list(device: &AdbSync, path: &str) -> Result<(), Box<dyn Error>> {
	let mut listing = device.list(path).await?;
	let mut count = 0;
	while let Some(entry) = listing.next().await {
		let entry = entry?;
		println!("{:>7o} {:>10} {:>10} {}", entry.stat.mode, entry.stat.size, entry.stat.mtime, entry.name);
		count += 1;
	}
	if count == 0 {
		warn!("{}: no entries (missing or unreadable)", path);
	}
	Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();

	let config_path = matches.get_one::<String>("config").map(PathBuf::from);
	let mut config = Config::load(config_path.as_deref())?;
	if let Some(serial) = matches.get_one::<String>("serial") {
		config.adb.serial = Some(serial.clone());
	}
	if let Some(level) = matches.get_one::<String>("log-level") {
		config.log_level = level.clone();
	}
	config.validate()?;
	init_tracing(&config.log_level);

	// FUSE callbacks block_on this runtime from fuser's thread, so main
	// itself must not run inside it
	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
	let device = AdbSync::new(&config.adb);

	match matches.subcommand() {
		Some(("mount", sub)) => {
			let mountpoint =
				sub.get_one::<String>("mountpoint").ok_or("mount: mountpoint argument required")?;
			mount(config, runtime, Path::new(mountpoint))?;
		}
		Some(("stat", sub)) => {
			let path = sub.get_one::<String>("path").ok_or("stat: path argument required")?;
			let stat = runtime.block_on(device.stat(path))?;
			println!("{}: mode {:o} size {} mtime {}", path, stat.mode, stat.size, stat.mtime);
		}
		Some(("ls", sub)) => {
			let path = sub.get_one::<String>("path").ok_or("ls: path argument required")?;
			runtime.block_on(list(&device, path))?;
		}
		Some(("pull", sub)) => {
			let remote = sub.get_one::<String>("remote").ok_or("pull: remote argument required")?;
			let local = sub.get_one::<String>("local").ok_or("pull: local argument required")?;
			runtime.block_on(device.pull(remote, Path::new(local)))?;
		}
		Some(("push", sub)) => {
			let local = sub.get_one::<String>("local").ok_or("push: local argument required")?;
			let remote = sub.get_one::<String>("remote").ok_or("push: remote argument required")?;
			runtime.block_on(device.push(Path::new(local), remote))?;
		}
		_ => {}
	}

	Ok(())
}

// vim: ts=4
