//! Wire protocol for the TL-x00 bulk polling interface
//!
//! This crate describes the logger's request/response protocol at the byte
//! level and provides the transport seam the polling driver runs over. It
//! has no USB dependency of its own, so the frame logic and everything built
//! on the [`Transport`] trait can be exercised with in-memory fakes.

pub mod frame;
pub mod transport;

pub use frame::{CMD_INIT, CMD_POLL, FRAME_LEN, Frame, Observation, command_frame};
pub use transport::{Connect, Transport, TransportError};
