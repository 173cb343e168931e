//! # Record-then-download
//!
//! Both peripherals capture samples into their own memory and hand them back
//! through the fixed 6-byte frame four bytes at a time:
//!
//! 1. The host sends a record command.
//! 2. [`poll_until`] reads status frames until the peripheral reports the
//!    capture finished (or failed), sleeping a fixed interval between reads.
//! 3. [`download`] requests chunk after chunk at increasing byte offsets until
//!    the advertised byte count is collected.
//! 4. [`decode_samples`] reinterprets the bytes as fixed-width samples.
//!
//! The transfer state (offset and accumulator) lives on the stack of the
//! calling operation and is dropped with it.

use crate::config::PollPolicy;
use crate::error::RigError;
use crate::estop::EmergencyStop;
use crate::frame::{CHUNK_LEN, Frame, pack_offset};
use crate::transport::Transport;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A fixed-width sample carried in one 4-byte chunk.
pub trait Sample: Sized {
    fn read_from(buf: &mut Bytes) -> Self;
}

/// HLFB readings are little-endian IEEE-754 singles.
impl Sample for f32 {
    fn read_from(buf: &mut Bytes) -> Self {
        buf.get_f32_le()
    }
}

/// Encoder positions are little-endian two's-complement.
impl Sample for i32 {
    fn read_from(buf: &mut Bytes) -> Self {
        buf.get_i32_le()
    }
}

/// Decode whole samples in wire order. Trailing bytes short of a full sample
/// are ignored.
pub fn decode_samples<S: Sample>(mut bytes: Bytes) -> Vec<S> {
    let count = bytes.len() / CHUNK_LEN;
    (0..count).map(|_| S::read_from(&mut bytes)).collect()
}

/// What a status frame means to the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Still working; wait and read again.
    Pending,
    /// Finished; stop polling.
    Done(T),
}

/// Read status frames from `address` until `classify` reports completion.
///
/// `classify` turns each frame into a [`PollStep`] or a terminal error. The
/// loop gives up with [`RigError::Timeout`] once `policy.max_attempts` reads
/// have come back pending or `policy.deadline` has passed.
pub fn poll_until<R, T, F>(
    transport: &mut R,
    address: u8,
    policy: &PollPolicy,
    estop: &EmergencyStop,
    mut classify: F,
) -> Result<T, RigError>
where
    R: Transport + ?Sized,
    F: FnMut(&Frame) -> Result<PollStep<T>, RigError>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if estop.is_engaged() {
            return Err(RigError::EmergencyStop);
        }

        let status = transport.read(address)?;
        attempts += 1;
        debug!(address = format_args!("{address:#04x}"), frame = %status, attempts, "poll");

        match classify(&status)? {
            PollStep::Done(value) => return Ok(value),
            PollStep::Pending => {
                let elapsed = started.elapsed();
                let deadline_passed = policy.deadline.is_some_and(|deadline| elapsed >= deadline);
                if attempts >= policy.max_attempts.max(1) || deadline_passed {
                    warn!(attempts, ?elapsed, "Peripheral still busy, giving up");
                    return Err(RigError::Timeout { attempts, elapsed });
                }
                if !policy.interval.is_zero() {
                    std::thread::sleep(policy.interval);
                }
            }
        }
    }
}

/// Where and how to fetch chunks from one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSource {
    pub address: u8,
    /// Opcode of the chunk request frame.
    pub opcode: u8,
    /// Status a peripheral answers with when the chunk is valid.
    pub chunk_status: u8,
    /// Delay between the request write and the response read.
    pub settle: Duration,
}

/// Download `total_bytes` from `source`, four bytes per exchange.
///
/// A response with any status other than `source.chunk_status` stops the
/// transfer at once; the bytes collected before it are returned inside
/// [`RigError::ChunkRejected`] and never as a complete result.
pub fn download<R>(
    transport: &mut R,
    source: &ChunkSource,
    total_bytes: u16,
    estop: &EmergencyStop,
) -> Result<Bytes, RigError>
where
    R: Transport + ?Sized,
{
    if total_bytes as usize % CHUNK_LEN != 0 {
        return Err(RigError::MisalignedLength { total_bytes });
    }
    if total_bytes == 0 {
        return Ok(Bytes::new());
    }

    info!(
        address = format_args!("{:#04x}", source.address),
        total_bytes, "Downloading captured data"
    );
    let mut collected = BytesMut::with_capacity(total_bytes as usize);
    let mut offset: u16 = 0;

    while offset < total_bytes {
        if estop.is_engaged() {
            return Err(RigError::EmergencyStop);
        }

        let request = Frame::encode(source.opcode, &pack_offset(offset))?;
        let response = transport.exchange(source.address, &request, source.settle)?;

        if response.code() != source.chunk_status {
            warn!(
                offset,
                status = format_args!("{:#04x}", response.code()),
                "Chunk read rejected"
            );
            return Err(RigError::ChunkRejected {
                offset,
                status: response.code(),
                partial: collected.freeze(),
            });
        }

        collected.put_slice(&response.chunk());
        offset += CHUNK_LEN as u16;
    }

    Ok(collected.freeze())
}

/// [`download`] followed by [`decode_samples`].
pub fn download_samples<R, S>(
    transport: &mut R,
    source: &ChunkSource,
    total_bytes: u16,
    estop: &EmergencyStop,
) -> Result<Vec<S>, RigError>
where
    R: Transport + ?Sized,
    S: Sample,
{
    let bytes = download(transport, source, total_bytes, estop)?;
    Ok(decode_samples(bytes))
}
