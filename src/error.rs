// src/error.rs

use bytes::Bytes;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure of the underlying bus exchange. Never retried by the driver.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peripheral at address {address:#04x} is unreachable")]
    Unreachable { address: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed response length: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload of {len} bytes does not fit in a frame (max 5)")]
    PayloadTooLong { len: usize },

    #[error("Frame must be exactly 6 bytes, got {actual}")]
    BadLength { actual: usize },
}

/// The primary error type for the `pitchmaster-rs` library.
#[derive(Error, Debug)]
pub enum RigError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("{parameter} = {value} is outside {bounds}")]
    OutOfRange {
        parameter: &'static str,
        value: String,
        bounds: &'static str,
    },

    #[error("Unexpected {peripheral} status {status:#04x}")]
    UnexpectedStatus { peripheral: &'static str, status: u8 },

    #[error("Chunk read rejected at offset {offset} with status {status:#04x} ({} bytes received)", .partial.len())]
    ChunkRejected { offset: u16, status: u8, partial: Bytes },

    #[error("Advertised transfer size {total_bytes} is not a multiple of 4")]
    MisalignedLength { total_bytes: u16 },

    #[error("Peripheral did not finish after {attempts} polls ({elapsed:?})")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error("Emergency stop is engaged")]
    EmergencyStop,
}

impl RigError {
    pub(crate) fn out_of_range(parameter: &'static str, value: impl ToString, bounds: &'static str) -> Self {
        RigError::OutOfRange {
            parameter,
            value: value.to_string(),
            bounds,
        }
    }

    /// True for the kinds caused by a status byte the driver did not expect.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            RigError::UnexpectedStatus { .. } | RigError::ChunkRejected { .. } | RigError::MisalignedLength { .. }
        )
    }
}
