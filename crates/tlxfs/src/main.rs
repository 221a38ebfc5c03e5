//! tlxfs daemon
//!
//! Mounts a read-only filesystem of logger readings and keeps a background
//! polling session alive for as long as the mount exists.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use tracing::info;

use tlxfs::config::Config;
use tlxfs::fs;
use tlxfs::session::SessionManager;
use tlxfs::usb::UsbConnector;

#[derive(Parser, Debug)]
#[command(name = "tlxfs")]
#[command(
    author,
    version,
    about = "Expose an Arexx TL-x00 temperature logger as a filesystem"
)]
#[command(long_about = "
Mounts a read-only filesystem with one file per logger channel. Each file is
named after the channel id and holds the latest raw value as four hex digits
and a newline. Without the hardware attached the directory is empty and the
daemon quietly retries discovery in the background.

EXAMPLES:
    # Mount on /mnt/tlx with the default config
    tlxfs /mnt/tlx

    # Mount with a custom config and verbose logging
    tlxfs --config ./tlxfs.toml --log-level debug /mnt/tlx

    # Write the default config to its standard location
    tlxfs --save-config

CONFIGURATION:
    The daemon looks for configuration in the following order:
    1. Path specified with --config
    2. ~/.config/tlxfs/config.toml
    3. /etc/tlxfs/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Directory to mount the readings filesystem on
    #[arg(value_name = "MOUNTPOINT", required_unless_present = "save_config")]
    mountpoint: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Allow other users to read the mounted filesystem
    #[arg(long)]
    allow_other: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = Config::default();
        let path = Config::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        Config::load(Some(path.clone())).context("failed to load configuration")?
    } else {
        Config::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    setup_logging(log_level).context("failed to set up logging")?;

    info!("tlxfs v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "logger identity {:04x}:{:04x}",
        config.usb.vendor_id, config.usb.product_id
    );

    let mountpoint = args.mountpoint.context("missing mountpoint")?;

    let connector = Arc::new(UsbConnector::new(
        config.usb.vendor_id,
        config.usb.product_id,
    ));
    let session = Arc::new(SessionManager::new(
        connector,
        config.usb.session_settings(),
    ));

    let allow_other = args.allow_other || config.mount.allow_other;
    let mount_result = fs::mount(
        Arc::clone(&session),
        &mountpoint,
        allow_other,
        config.mount.auto_unmount,
    );

    info!("unmounted, stopping polling session");
    session.shutdown();

    mount_result.with_context(|| format!("failed to mount on {}", mountpoint.display()))
}
