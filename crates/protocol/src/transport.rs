//! Transport seam between the polling driver and the physical USB stack
//!
//! The driver only ever sends one frame and waits for one frame back, so the
//! whole transport surface is a blocking write/read pair plus a way to
//! (re)establish the link. Everything that can go wrong here is recoverable
//! at the session level: the session manager reacts to any of these errors
//! by closing the session and retrying discovery later.

use std::time::Duration;

use thiserror::Error;

/// Transport-level failures, all recoverable by reconnecting.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No device with the expected identity is currently attached.
    #[error("device not present")]
    DeviceAbsent,

    /// A device was found but could not be opened or its interface claimed.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// A transfer failed mid-session; the link is considered lost.
    #[error("transfer failed: {0}")]
    TransferFailed(String),
}

/// One open request/response channel to the device.
///
/// Implementations release whatever they hold (claimed interface, device
/// handle) when dropped, on every exit path.
pub trait Transport: Send {
    /// Send one frame on the OUT endpoint. Returns the bytes transferred.
    fn write(&mut self, frame: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Receive one frame from the IN endpoint into `buf`. Returns the bytes
    /// transferred, which may be fewer than requested.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}

/// Device discovery: locate the logger and open a fresh [`Transport`] to it.
pub trait Connect: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::DeviceAbsent.to_string(), "device not present");

        let err = TransportError::OpenFailed("interface busy".into());
        assert!(err.to_string().contains("interface busy"));

        let err = TransportError::TransferFailed("broken pipe".into());
        assert!(err.to_string().starts_with("transfer failed"));
    }
}
