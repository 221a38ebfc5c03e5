//! rusb-backed transport
//!
//! Finds the logger by vendor/product identity, opens it, claims its single
//! bulk interface pair, and exposes the endpoints as a [`Transport`]. The
//! claimed interface is released (and the kernel driver reattached) when the
//! transport is dropped, whichever way the session ended.

use std::time::Duration;

use protocol::{Connect, Transport, TransportError};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use tracing::{debug, warn};

/// Locates the logger among attached USB devices and opens a session to it.
#[derive(Debug, Clone)]
pub struct UsbConnector {
    vendor_id: u16,
    product_id: u16,
}

impl UsbConnector {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl Connect for UsbConnector {
    fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let context = Context::new().map_err(open_failed)?;
        let devices = context.devices().map_err(open_failed)?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    debug!("unreadable device descriptor: {}", e);
                    continue;
                }
            };

            if descriptor.vendor_id() == self.vendor_id
                && descriptor.product_id() == self.product_id
            {
                debug!(
                    "found logger {:04x}:{:04x} on bus {} addr {}",
                    self.vendor_id,
                    self.product_id,
                    device.bus_number(),
                    device.address()
                );
                let transport = UsbTransport::open(device)?;
                return Ok(Box::new(transport));
            }
        }

        Err(TransportError::DeviceAbsent)
    }
}

/// The bulk interface pair the polling protocol runs over.
#[derive(Debug, Clone, Copy)]
struct BulkEndpoints {
    interface: u8,
    ep_in: u8,
    ep_out: u8,
}

/// One open device handle with its interface claimed.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    endpoints: BulkEndpoints,
}

impl UsbTransport {
    fn open(device: Device<Context>) -> Result<Self, TransportError> {
        let endpoints = find_bulk_endpoints(&device)?;
        let handle = device.open().map_err(open_failed)?;

        // The kernel's own driver may have bound the interface; take it over
        // for the lifetime of the session.
        match handle.kernel_driver_active(endpoints.interface) {
            Ok(true) => {
                debug!(
                    "detaching kernel driver from interface {}",
                    endpoints.interface
                );
                handle
                    .detach_kernel_driver(endpoints.interface)
                    .map_err(open_failed)?;
            }
            Ok(false) => {}
            Err(e) => {
                debug!("could not query kernel driver state: {}", e);
            }
        }

        handle
            .claim_interface(endpoints.interface)
            .map_err(open_failed)?;
        debug!(
            "claimed interface {} (out {:#04x}, in {:#04x})",
            endpoints.interface, endpoints.ep_out, endpoints.ep_in
        );

        Ok(Self { handle, endpoints })
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, frame: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        self.handle
            .write_bulk(self.endpoints.ep_out, frame, timeout)
            .map_err(transfer_failed)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.handle
            .read_bulk(self.endpoints.ep_in, buf, timeout)
            .map_err(transfer_failed)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.endpoints.interface) {
            warn!(
                "failed to release interface {}: {}",
                self.endpoints.interface, e
            );
        }
        // Hand the device back to the kernel; failure is routine when no
        // driver was bound in the first place.
        if let Err(e) = self.handle.attach_kernel_driver(self.endpoints.interface) {
            debug!("could not reattach kernel driver: {}", e);
        }
    }
}

/// Locate the first bulk IN and bulk OUT endpoints in the active
/// configuration.
fn find_bulk_endpoints(device: &Device<Context>) -> Result<BulkEndpoints, TransportError> {
    let config = device.active_config_descriptor().map_err(open_failed)?;

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            let mut ep_in = None;
            let mut ep_out = None;

            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    Direction::In if ep_in.is_none() => ep_in = Some(endpoint.address()),
                    Direction::Out if ep_out.is_none() => ep_out = Some(endpoint.address()),
                    _ => {}
                }
            }

            if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
                return Ok(BulkEndpoints {
                    interface: descriptor.interface_number(),
                    ep_in,
                    ep_out,
                });
            }
        }
    }

    Err(TransportError::OpenFailed(
        "no bulk endpoint pair found".to_string(),
    ))
}

fn open_failed(err: rusb::Error) -> TransportError {
    TransportError::OpenFailed(err.to_string())
}

fn transfer_failed(err: rusb::Error) -> TransportError {
    TransportError::TransferFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            open_failed(rusb::Error::Access),
            TransportError::OpenFailed(_)
        ));
        assert!(matches!(
            transfer_failed(rusb::Error::Timeout),
            TransportError::TransferFailed(_)
        ));
    }

    #[test]
    fn test_connector_without_device() {
        // No TL-x00 hardware on build machines; discovery must degrade to
        // a recoverable error, never a panic. Absence and an unavailable
        // USB stack are both acceptable here.
        let connector = UsbConnector::new(0x0451, 0x3211);
        assert!(connector.connect().is_err());
    }
}
