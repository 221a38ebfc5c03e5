//! tlxfs — a USB temperature logger as a filesystem
//!
//! Bridges an Arexx TL-x00 multi-channel logger to a read-only FUSE mount:
//! one file per channel id, each holding the latest raw value as four hex
//! digits and a newline.
//!
//! A single background thread ([`session::SessionManager`]) owns the device:
//! it polls over the bulk interface ([`usb`]), decodes frames, and keeps the
//! latest reading per channel in an in-memory cache ([`store`]). The
//! filesystem layer ([`fs`]) only reads the cache and lazily kicks the
//! session off on first access. When the device is unplugged the session
//! manager silently retries discovery at a fixed interval, so a mount
//! without hardware is simply an empty directory.

pub mod config;
pub mod fs;
pub mod session;
pub mod store;
pub mod usb;
