//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use pitchmaster_rs::config::{PollPolicy, RigConfig, Timing};
#[allow(unused_imports)]
pub use pitchmaster_rs::emulator::EmulatedTransport;
#[allow(unused_imports)]
pub use pitchmaster_rs::encoder::Capture;
#[allow(unused_imports)]
pub use pitchmaster_rs::error::{RigError, TransportError};
#[allow(unused_imports)]
pub use pitchmaster_rs::estop::EmergencyStop;
#[allow(unused_imports)]
pub use pitchmaster_rs::frame::Frame;
#[allow(unused_imports)]
pub use pitchmaster_rs::protocol::{
    Direction, ENCODER_ADDR, EncoderOpcode, EncoderStatus, MOTOR_ADDR, MotorOpcode, MotorStatus,
};
#[allow(unused_imports)]
pub use pitchmaster_rs::transport::Transport;
#[allow(unused_imports)]
pub use pitchmaster_rs::Rig;

use std::collections::VecDeque;

/// A session over `transport` with every delay set to zero.
#[allow(dead_code)]
pub fn instant_rig<T: Transport>(transport: T) -> Rig<T> {
    Rig::new(transport, RigConfig::instant())
}

/// Build a reply frame, zero-padded.
#[allow(dead_code)]
pub fn frame(code: u8, payload: &[u8]) -> Frame {
    Frame::encode(code, payload).expect("payload fits in a frame")
}

/// Little-endian u16 at `index` and `index + 1` of a frame.
#[allow(dead_code)]
pub fn le16(frame: &Frame, index: usize) -> u16 {
    let raw = frame.as_bytes();
    u16::from_le_bytes([raw[index], raw[index + 1]])
}

/// Big-endian u16 at `index` and `index + 1` of a frame.
#[allow(dead_code)]
pub fn be16(frame: &Frame, index: usize) -> u16 {
    let raw = frame.as_bytes();
    u16::from_be_bytes([raw[index], raw[index + 1]])
}

/// Replays canned response frames in order and records what the host wrote.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedTransport {
    responses: VecDeque<Frame>,
    pub writes: Vec<(u8, Frame)>,
    pub reads: usize,
    trip: Option<(usize, EmergencyStop)>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Engage `estop` right after the `after_reads`-th read returns.
    pub fn engage_after(mut self, after_reads: usize, estop: EmergencyStop) -> Self {
        self.trip = Some((after_reads, estop));
        self
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, address: u8, frame: &Frame) -> Result<(), TransportError> {
        self.writes.push((address, *frame));
        Ok(())
    }

    fn read(&mut self, address: u8) -> Result<Frame, TransportError> {
        let frame = self
            .responses
            .pop_front()
            .ok_or(TransportError::Unreachable { address })?;
        self.reads += 1;
        if let Some((after, estop)) = &self.trip {
            if self.reads == *after {
                estop.engage();
            }
        }
        Ok(frame)
    }
}
