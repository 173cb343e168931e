use crate::config::RigConfig;
use crate::error::RigError;
use crate::estop::EmergencyStop;
use crate::frame::Frame;
use crate::motor::halt_after_abort;
use crate::protocol::{DEFAULT_ARM_SAMPLES, EncoderOpcode, EncoderStatus};
use crate::transfer::{ChunkSource, PollStep, download_samples, poll_until};
use crate::transport::Transport;
use num_enum::FromPrimitive;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of asking for captured data: either the samples, or a busy
/// peripheral that should be asked again later.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "samples", rename_all = "snake_case")]
pub enum Capture<T> {
    Ready(Vec<T>),
    NotReady,
}

impl<T> Capture<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Capture::Ready(_))
    }

    pub fn into_samples(self) -> Option<Vec<T>> {
        match self {
            Capture::Ready(samples) => Some(samples),
            Capture::NotReady => None,
        }
    }
}

/// Handle to the encoder peripheral, borrowed from a [`Rig`](crate::Rig).
pub struct Encoder<'a, T: Transport> {
    transport: &'a mut T,
    config: &'a RigConfig,
    estop: &'a EmergencyStop,
}

impl<'a, T: Transport> Encoder<'a, T> {
    pub(crate) fn new(transport: &'a mut T, config: &'a RigConfig, estop: &'a EmergencyStop) -> Self {
        Self {
            transport,
            config,
            estop,
        }
    }

    /// Read the shaft position once, without the trigger.
    ///
    /// `None` means the peripheral answered with something other than a
    /// single-shot result (busy or idle); that is not an error.
    pub fn read_single_sample(&mut self) -> Result<Option<u32>, RigError> {
        let request = Frame::encode(EncoderOpcode::SingleShot.into(), &[])?;
        let response = self.transport.exchange(
            self.config.encoder_address,
            &request,
            self.config.timing.single_shot_settle,
        )?;

        match EncoderStatus::from_primitive(response.code()) {
            EncoderStatus::SingleShotReady => Ok(Some(response.u32_le())),
            other => {
                info!(status = %other, code = format_args!("{:#04x}", response.code()), "Single shot not available");
                Ok(None)
            }
        }
    }

    /// Arm the trigger for `samples` captures (200 when `None`).
    ///
    /// Fire-and-forget: the peripheral does not acknowledge, so success only
    /// means the write went out.
    pub fn arm(&mut self, samples: Option<u32>) -> Result<(), RigError> {
        let requested = samples.unwrap_or(u32::from(DEFAULT_ARM_SAMPLES));
        let samples = u8::try_from(requested)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| RigError::out_of_range("samples", requested, "[1, 255]"))?;
        if self.estop.is_engaged() {
            warn!("Cannot arm encoder: emergency stop is engaged");
            return Err(RigError::EmergencyStop);
        }

        info!(samples, "Arming encoder");
        let request = Frame::encode(EncoderOpcode::Record.into(), &[samples])?;
        debug!(frame = %request, "bus write");
        self.transport.write(self.config.encoder_address, &request)?;
        if !self.config.timing.arm_settle.is_zero() {
            std::thread::sleep(self.config.timing.arm_settle);
        }
        info!("Encoder armed, waiting for triggers");
        Ok(())
    }

    /// Check the capture once and download it if it is complete.
    ///
    /// If the emergency stop cuts the download short, EMERGENCY_STOP is sent
    /// to the motor before the error is returned.
    pub fn read_captured_data(&mut self) -> Result<Capture<i32>, RigError> {
        let result = self.check_capture();
        self.halt_on_abort(result)
    }

    /// Poll until the armed capture completes, then download it.
    ///
    /// Aborts like [`Encoder::read_captured_data`] when the emergency stop is
    /// engaged.
    pub fn wait_for_captured_data(&mut self) -> Result<Vec<i32>, RigError> {
        let result = self.poll_capture();
        self.halt_on_abort(result)
    }

    fn halt_on_abort<V>(&mut self, result: Result<V, RigError>) -> Result<V, RigError> {
        if matches!(result, Err(RigError::EmergencyStop)) {
            halt_after_abort(self.transport, self.config, "Encoder capture");
        }
        result
    }

    fn check_capture(&mut self) -> Result<Capture<i32>, RigError> {
        let status = self.transport.read(self.config.encoder_address)?;
        debug!(frame = %status, "bus read");

        match EncoderStatus::from_primitive(status.code()) {
            EncoderStatus::Capturing => {
                info!("Encoder is still capturing");
                Ok(Capture::NotReady)
            }
            EncoderStatus::Ready => {
                let total_bytes = status.u16_le_at(1);
                self.download(total_bytes).map(Capture::Ready)
            }
            other => {
                warn!(status = format_args!("{:#04x}", status.code()), "Unexpected encoder status");
                Err(RigError::UnexpectedStatus {
                    peripheral: "encoder",
                    status: other.into(),
                })
            }
        }
    }

    fn poll_capture(&mut self) -> Result<Vec<i32>, RigError> {
        let address = self.config.encoder_address;
        let total_bytes = poll_until(self.transport, address, &self.config.poll, self.estop, |frame| {
            match EncoderStatus::from_primitive(frame.code()) {
                EncoderStatus::Capturing => Ok(PollStep::Pending),
                EncoderStatus::Ready => Ok(PollStep::Done(frame.u16_le_at(1))),
                other => Err(RigError::UnexpectedStatus {
                    peripheral: "encoder",
                    status: other.into(),
                }),
            }
        })?;
        self.download(total_bytes)
    }

    fn download(&mut self, total_bytes: u16) -> Result<Vec<i32>, RigError> {
        info!(total_bytes, "Encoder data ready");
        let source = ChunkSource {
            address: self.config.encoder_address,
            opcode: EncoderOpcode::ReadChunk.into(),
            chunk_status: EncoderStatus::Chunk.into(),
            settle: self.config.timing.chunk_settle,
        };
        let positions: Vec<i32> = download_samples(self.transport, &source, total_bytes, self.estop)?;
        info!(count = positions.len(), "Encoder download complete");
        Ok(positions)
    }
}
