use crate::error::TransportError;
use crate::frame::Frame;
use std::time::Duration;
use tracing::debug;

/// Half-duplex access to the rig bus.
///
/// Implementations block until the frame is written or read. They never
/// retry; a failure is reported once and the current operation is abandoned.
pub trait Transport {
    /// Write one frame to the peripheral at `address`.
    fn write(&mut self, address: u8, frame: &Frame) -> Result<(), TransportError>;

    /// Read one frame back from the peripheral at `address`.
    fn read(&mut self, address: u8) -> Result<Frame, TransportError>;

    /// Write `request`, wait `settle` for the peripheral to act on it, then
    /// read the paired response.
    fn exchange(&mut self, address: u8, request: &Frame, settle: Duration) -> Result<Frame, TransportError> {
        debug!(address = format_args!("{address:#04x}"), frame = %request, "bus write");
        self.write(address, request)?;
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        let response = self.read(address)?;
        debug!(address = format_args!("{address:#04x}"), frame = %response, "bus read");
        Ok(response)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, address: u8, frame: &Frame) -> Result<(), TransportError> {
        (**self).write(address, frame)
    }

    fn read(&mut self, address: u8) -> Result<Frame, TransportError> {
        (**self).read(address)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, address: u8, frame: &Frame) -> Result<(), TransportError> {
        (**self).write(address, frame)
    }

    fn read(&mut self, address: u8) -> Result<Frame, TransportError> {
        (**self).read(address)
    }
}
