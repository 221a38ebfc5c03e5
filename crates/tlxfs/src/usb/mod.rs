//! USB side of the bridge
//!
//! `device` implements the transport seam with rusb: discovery by USB
//! identity, open/claim of the bulk interface pair, and the transfers
//! themselves. `poller` drives the request/response protocol over whatever
//! transport it is given.

pub mod device;
pub mod poller;

pub use device::UsbConnector;
pub use poller::Poller;
