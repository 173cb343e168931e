//! # Bus frame
//!
//! Every exchange with either peripheral moves exactly one 6-byte frame in
//! each direction. Byte 0 carries the opcode (host to peripheral) or the
//! status code (peripheral to host); bytes 1..=5 carry a payload whose layout
//! depends on that code. Unused trailing bytes are always zero.
//!
//! The payload is not self-describing, so the field readers below take the
//! frame index of the field. Endianness differs per field because the two
//! peripheral firmwares were written independently; the readers name the
//! layout they decode rather than normalising it.

use crate::error::FrameError;
use bytes::{Buf, Bytes};
use std::fmt;

/// Total length of a frame on the wire.
pub const FRAME_LEN: usize = 6;

/// Number of payload bytes following the opcode/status byte.
pub const PAYLOAD_LEN: usize = FRAME_LEN - 1;

/// Width of one bulk-transfer chunk carried in payload bytes 1..=4.
pub const CHUNK_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Build a frame from an opcode and up to five payload bytes.
    pub fn encode(code: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        let mut raw = [0u8; FRAME_LEN];
        raw[0] = code;
        raw[1..=payload.len()].copy_from_slice(payload);
        Ok(Self(raw))
    }

    /// Wrap six raw bytes read off the bus. Never fails; interpreting the
    /// payload is up to the caller.
    pub const fn decode(raw: [u8; FRAME_LEN]) -> Self {
        Self(raw)
    }

    /// Opcode or status code in byte 0.
    pub fn code(&self) -> u8 {
        self.0[0]
    }

    /// Payload bytes 1..=5, zero-padded.
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&self.0[1..]);
        payload
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// The 4-byte chunk carried in bytes 1..=4 of a chunk response.
    pub fn chunk(&self) -> [u8; CHUNK_LEN] {
        let mut chunk = [0u8; CHUNK_LEN];
        chunk.copy_from_slice(&self.0[1..=CHUNK_LEN]);
        chunk
    }

    /// Reads a 16-bit value stored low byte first at `index` and `index + 1`.
    ///
    /// Panics if `index` is not in 1..=4; callers pass protocol constants.
    pub(crate) fn u16_le_at(&self, index: usize) -> u16 {
        u16::from(self.0[index]) | (u16::from(self.0[index + 1]) << 8)
    }

    /// Reads a 16-bit value stored high byte first at `index` and `index + 1`.
    pub(crate) fn u16_be_at(&self, index: usize) -> u16 {
        (u16::from(self.0[index]) << 8) | u16::from(self.0[index + 1])
    }

    /// Reads a little-endian u32 from bytes 1..=4.
    pub fn u32_le(&self) -> u32 {
        (&self.0[1..=CHUNK_LEN]).get_u32_le()
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = FrameError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; FRAME_LEN] = bytes
            .try_into()
            .map_err(|_| FrameError::BadLength { actual: bytes.len() })?;
        Ok(Self::decode(raw))
    }
}

impl TryFrom<Bytes> for Frame {
    type Error = FrameError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        Frame::try_from(bytes.as_ref())
    }
}

impl From<Frame> for Bytes {
    fn from(frame: Frame) -> Self {
        Bytes::copy_from_slice(&frame.0)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// START payload bytes 1-2: duty cycle, high byte first.
pub fn pack_duty(duty: u16) -> [u8; 2] {
    duty.to_be_bytes()
}

/// Chunk request payload bytes 1-2: byte offset, low byte first.
pub fn pack_offset(offset: u16) -> [u8; 2] {
    offset.to_le_bytes()
}
