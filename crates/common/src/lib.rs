//! Shared plumbing for the tlxfs crates
//!
//! Error type and logging setup used by the daemon and its tests.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
