//! Device error types.

use nodelight_core::FrameError;
use thiserror::Error;

/// Errors surfaced by the device bridge.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The serial channel could not be opened.
    #[error("failed to open device at {address}: {source}")]
    Connection {
        /// Serial address that was tried.
        address: String,
        /// Underlying serial error.
        #[source]
        source: serialport::Error,
    },
    /// A command could not be encoded.
    #[error("failed to encode command: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Writing to the device failed.
    #[error("failed to write to device: {0}")]
    Write(#[from] std::io::Error),
    /// An inbound command frame could not be decoded.
    #[error("invalid command frame: {0}")]
    Decode(#[from] FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_names_address() {
        let err = DeviceError::Connection {
            address: "/dev/ttyUSB9".into(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyUSB9"));
        assert!(msg.contains("no such device"));
    }

    #[test]
    fn write_error_from_io() {
        let err: DeviceError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, DeviceError::Write(_)));
    }
}
