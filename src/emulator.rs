//! # Emulated rig
//!
//! A deterministic stand-in for both peripherals, used when no bus is
//! attached and in tests. Each write updates a small model of the addressed
//! peripheral; the next read answers the command just issued, or reports the
//! model's status when there is no command reply waiting.
//!
//! Captures are served from fixed internal tables ([`EmulatedTransport::hlfb_table`]
//! and [`EmulatedTransport::encoder_table`]), so a caller can compare what
//! it downloaded against the source values.

use crate::error::TransportError;
use crate::frame::{CHUNK_LEN, FRAME_LEN, Frame, PAYLOAD_LEN};
use crate::protocol::{ENCODER_ADDR, EncoderOpcode, EncoderStatus, MOTOR_ADDR, MotorOpcode, MotorStatus};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashSet;
use tracing::trace;

/// Entries in each capture table; one more than a u8 sample count can ask for.
const TABLE_LEN: usize = 256;

const FIRST_POSITION: u32 = 1024;
const POSITION_STEP: u32 = 17;

/// One frame the host wrote, or one frame the emulator answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRecord {
    pub address: u8,
    pub frame: Frame,
}

#[derive(Debug, Default)]
struct PendingCapture {
    samples: u8,
    busy_polls: u32,
}

#[derive(Debug, Default)]
struct MotorModel {
    running: bool,
    capture: Option<PendingCapture>,
    reply: Option<Frame>,
}

#[derive(Debug, Default)]
struct EncoderModel {
    capture: Option<PendingCapture>,
    position: u32,
    reply: Option<Frame>,
}

#[derive(Debug)]
pub struct EmulatedTransport {
    motor_address: u8,
    encoder_address: u8,
    motor: MotorModel,
    encoder: EncoderModel,
    hlfb_table: Vec<f32>,
    encoder_table: Vec<i32>,
    hlfb_bytes: Bytes,
    encoder_bytes: Bytes,
    hlfb_busy_polls: u32,
    encoder_busy_polls: u32,
    chunk_faults: HashSet<(u8, u16)>,
    disconnected: HashSet<u8>,
    writes: Vec<BusRecord>,
    reads: Vec<BusRecord>,
}

impl Default for EmulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedTransport {
    pub fn new() -> Self {
        let hlfb_table: Vec<f32> = (0..TABLE_LEN)
            .map(|i| 50.0 + 45.0 * (i as f32 * 0.1).sin())
            .collect();
        let encoder_table: Vec<i32> = (0..TABLE_LEN as i32).map(|i| (i * 97) % 4000 - 2000).collect();

        let mut hlfb_bytes = BytesMut::with_capacity(TABLE_LEN * CHUNK_LEN);
        hlfb_table.iter().for_each(|v| hlfb_bytes.put_f32_le(*v));
        let mut encoder_bytes = BytesMut::with_capacity(TABLE_LEN * CHUNK_LEN);
        encoder_table.iter().for_each(|v| encoder_bytes.put_i32_le(*v));

        Self {
            motor_address: MOTOR_ADDR,
            encoder_address: ENCODER_ADDR,
            motor: MotorModel::default(),
            encoder: EncoderModel {
                position: FIRST_POSITION,
                ..EncoderModel::default()
            },
            hlfb_table,
            encoder_table,
            hlfb_bytes: hlfb_bytes.freeze(),
            encoder_bytes: encoder_bytes.freeze(),
            hlfb_busy_polls: 0,
            encoder_busy_polls: 0,
            chunk_faults: HashSet::new(),
            disconnected: HashSet::new(),
            writes: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// Answer on non-default addresses.
    pub fn with_addresses(mut self, motor: u8, encoder: u8) -> Self {
        self.motor_address = motor;
        self.encoder_address = encoder;
        self
    }

    /// Report HLFB_CAPTURING this many times before HLFB_RECORDED.
    pub fn with_hlfb_capture_polls(mut self, polls: u32) -> Self {
        self.hlfb_busy_polls = polls;
        self
    }

    /// Report CAPTURING this many times before READY.
    pub fn with_encoder_capture_polls(mut self, polls: u32) -> Self {
        self.encoder_busy_polls = polls;
        self
    }

    /// Answer the chunk request for `offset` at `address` with a non-chunk status.
    pub fn fail_chunk_at(&mut self, address: u8, offset: u16) {
        self.chunk_faults.insert((address, offset));
    }

    /// Make every exchange with `address` fail as unreachable.
    pub fn disconnect(&mut self, address: u8) {
        self.disconnected.insert(address);
    }

    pub fn reconnect(&mut self, address: u8) {
        self.disconnected.remove(&address);
    }

    pub fn hlfb_table(&self) -> &[f32] {
        &self.hlfb_table
    }

    pub fn encoder_table(&self) -> &[i32] {
        &self.encoder_table
    }

    pub fn is_motor_running(&self) -> bool {
        self.motor.running
    }

    /// Every frame written so far, in order.
    pub fn writes(&self) -> &[BusRecord] {
        &self.writes
    }

    /// Every frame answered so far, in order.
    pub fn reads(&self) -> &[BusRecord] {
        &self.reads
    }

    pub fn clear_history(&mut self) {
        self.writes.clear();
        self.reads.clear();
    }

    fn check_connected(&self, address: u8) -> Result<(), TransportError> {
        if self.disconnected.contains(&address) || (address != self.motor_address && address != self.encoder_address)
        {
            return Err(TransportError::Unreachable { address });
        }
        Ok(())
    }

    fn chunk_reply(&self, address: u8, table: &Bytes, ok_status: u8, fault_status: u8, request: &Frame) -> Frame {
        let offset = request.u16_le_at(1);
        if self.chunk_faults.contains(&(address, offset)) {
            return reply(fault_status, []);
        }
        let start = usize::from(offset).min(table.len());
        let end = (start + CHUNK_LEN).min(table.len());
        let mut chunk = [0u8; CHUNK_LEN];
        chunk[..end - start].copy_from_slice(&table[start..end]);
        reply(ok_status, chunk)
    }

    fn write_motor(&mut self, frame: &Frame) {
        let model_reply = match MotorOpcode::try_from(frame.code()).ok() {
            Some(MotorOpcode::Start) => {
                self.motor.running = true;
                let [duty_hi, duty_lo, ramp, direction, _] = frame.payload();
                reply(MotorStatus::Running.into(), [duty_hi, duty_lo, ramp, direction])
            }
            Some(MotorOpcode::Stop) => {
                self.motor.running = false;
                reply(MotorStatus::Stopped.into(), [])
            }
            Some(MotorOpcode::EmergencyStop) => {
                self.motor.running = false;
                self.motor.capture = None;
                reply(MotorStatus::Stopped.into(), [])
            }
            Some(MotorOpcode::RecordHlfb) => {
                self.motor.capture = Some(PendingCapture {
                    samples: frame.payload()[0],
                    busy_polls: self.hlfb_busy_polls,
                });
                self.motor.reply = None;
                return;
            }
            Some(MotorOpcode::ReadHlfbChunk) => self.chunk_reply(
                self.motor_address,
                &self.hlfb_bytes,
                MotorStatus::HlfbDataChunk.into(),
                MotorStatus::Error.into(),
                frame,
            ),
            None => reply(MotorStatus::Error.into(), []),
        };
        self.motor.reply = Some(model_reply);
    }

    fn write_encoder(&mut self, frame: &Frame) {
        let model_reply = match EncoderOpcode::try_from(frame.code()).ok() {
            Some(EncoderOpcode::SingleShot) => {
                let position = self.encoder.position;
                self.encoder.position = position.wrapping_add(POSITION_STEP);
                reply(EncoderStatus::SingleShotReady.into(), position.to_le_bytes())
            }
            Some(EncoderOpcode::Record) => {
                self.encoder.capture = Some(PendingCapture {
                    samples: frame.payload()[0],
                    busy_polls: self.encoder_busy_polls,
                });
                self.encoder.reply = None;
                return;
            }
            Some(EncoderOpcode::ReadChunk) => self.chunk_reply(
                self.encoder_address,
                &self.encoder_bytes,
                EncoderStatus::Chunk.into(),
                EncoderStatus::Idle.into(),
                frame,
            ),
            None => reply(EncoderStatus::Idle.into(), []),
        };
        self.encoder.reply = Some(model_reply);
    }

    fn motor_status(&mut self) -> Frame {
        match self.motor.capture.as_mut() {
            Some(capture) if capture.busy_polls > 0 => {
                capture.busy_polls -= 1;
                reply(MotorStatus::HlfbCapturing.into(), [])
            }
            Some(capture) => {
                let [lo, hi] = byte_count(capture.samples);
                reply(MotorStatus::HlfbRecorded.into(), [capture.samples, lo, hi])
            }
            None if self.motor.running => reply(MotorStatus::Running.into(), []),
            None => reply(MotorStatus::Stopped.into(), []),
        }
    }

    fn encoder_status(&mut self) -> Frame {
        match self.encoder.capture.as_mut() {
            Some(capture) if capture.busy_polls > 0 => {
                capture.busy_polls -= 1;
                reply(EncoderStatus::Capturing.into(), [])
            }
            Some(capture) => reply(EncoderStatus::Ready.into(), byte_count(capture.samples)),
            None => reply(EncoderStatus::Idle.into(), []),
        }
    }
}

impl crate::transport::Transport for EmulatedTransport {
    fn write(&mut self, address: u8, frame: &Frame) -> Result<(), TransportError> {
        self.check_connected(address)?;
        self.writes.push(BusRecord { address, frame: *frame });
        if address == self.motor_address {
            self.write_motor(frame);
        } else {
            self.write_encoder(frame);
        }
        Ok(())
    }

    fn read(&mut self, address: u8) -> Result<Frame, TransportError> {
        self.check_connected(address)?;
        let frame = if address == self.motor_address {
            match self.motor.reply.take() {
                Some(frame) => frame,
                None => self.motor_status(),
            }
        } else {
            match self.encoder.reply.take() {
                Some(frame) => frame,
                None => self.encoder_status(),
            }
        };
        trace!(address = format_args!("{address:#04x}"), %frame, "emulated reply");
        self.reads.push(BusRecord { address, frame });
        Ok(frame)
    }
}

/// Byte count of a capture, low byte first.
fn byte_count(samples: u8) -> [u8; 2] {
    (u16::from(samples) * CHUNK_LEN as u16).to_le_bytes()
}

/// Status frame with a payload whose size is checked at compile time.
fn reply<const N: usize>(status: u8, payload: [u8; N]) -> Frame {
    const { assert!(N <= PAYLOAD_LEN, "reply payload does not fit in a frame") };
    let mut raw = [0u8; FRAME_LEN];
    raw[0] = status;
    raw[1..=N].copy_from_slice(&payload);
    Frame::decode(raw)
}
