use crate::config::RigConfig;
use crate::error::RigError;
use crate::estop::EmergencyStop;
use crate::frame::{Frame, pack_duty};
use crate::protocol::{Direction, MotorOpcode, MotorStatus};
use crate::transfer::{ChunkSource, PollStep, download_samples, poll_until};
use crate::transport::Transport;
use num_enum::FromPrimitive;
use tracing::{info, warn};

/// Highest operating speed (Hz) a motor with the given top speed can run at.
pub fn max_operating_hz(max_speed_rpm: f64) -> f64 {
    max_speed_rpm / 60.0
}

/// Send EMERGENCY_STOP to the motor after the latch aborted `operation`.
///
/// Best effort: a failed send is logged and the caller still reports the
/// abort. Used by every capture that can be cut short by the latch, so an
/// external trigger stops the motor whichever peripheral was busy.
pub(crate) fn halt_after_abort<R>(transport: &mut R, config: &RigConfig, operation: &str)
where
    R: Transport + ?Sized,
{
    warn!("{operation} aborted by emergency stop");
    let sent = Frame::encode(MotorOpcode::EmergencyStop.into(), &[])
        .map_err(RigError::from)
        .and_then(|request| {
            transport
                .exchange(config.motor_address, &request, config.timing.write_settle)
                .map_err(RigError::from)
        });
    if let Err(e) = sent {
        warn!("Emergency stop send failed: {e}");
    }
}

/// A validated START request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCommand {
    duty: u16,
    ramp_multiplier: u8,
    direction: Direction,
}

impl StartCommand {
    /// Checks every parameter before anything touches the bus.
    ///
    /// The duty cycle is `operating_speed_hz * 60 / max_speed_rpm` and must
    /// land in `[0, 1]`; it is then scaled to `0..=65535`.
    pub fn new(
        max_speed_rpm: f64,
        operating_speed_hz: f64,
        ramp_multiplier: u32,
        direction: Direction,
    ) -> Result<Self, RigError> {
        if !max_speed_rpm.is_finite() || max_speed_rpm <= 0.0 {
            return Err(RigError::out_of_range("max_speed_rpm", max_speed_rpm, "(0, inf)"));
        }
        let duty_cycle = operating_speed_hz * 60.0 / max_speed_rpm;
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(RigError::out_of_range("duty_cycle", duty_cycle, "[0, 1]"));
        }
        let ramp_multiplier = u8::try_from(ramp_multiplier)
            .map_err(|_| RigError::out_of_range("ramp_multiplier", ramp_multiplier, "[0, 255]"))?;

        Ok(Self {
            duty: (duty_cycle * f64::from(u16::MAX)).round() as u16,
            ramp_multiplier,
            direction,
        })
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }

    pub fn ramp_multiplier(&self) -> u8 {
        self.ramp_multiplier
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// `[duty_hi, duty_lo, ramp, direction]`
    pub fn payload(&self) -> [u8; 4] {
        let [hi, lo] = pack_duty(self.duty);
        [hi, lo, self.ramp_multiplier, self.direction.as_bit()]
    }
}

/// Handle to the motor peripheral, borrowed from a [`Rig`](crate::Rig).
pub struct Motor<'a, T: Transport> {
    transport: &'a mut T,
    config: &'a RigConfig,
    estop: &'a EmergencyStop,
}

impl<'a, T: Transport> Motor<'a, T> {
    pub(crate) fn new(transport: &'a mut T, config: &'a RigConfig, estop: &'a EmergencyStop) -> Self {
        Self {
            transport,
            config,
            estop,
        }
    }

    /// Validate the parameters, send START and return the status the motor
    /// answers with. Refused while the emergency stop is engaged.
    pub fn start(
        &mut self,
        max_speed_rpm: f64,
        operating_speed_hz: f64,
        ramp_multiplier: u32,
        direction: Direction,
    ) -> Result<MotorStatus, RigError> {
        let command = StartCommand::new(max_speed_rpm, operating_speed_hz, ramp_multiplier, direction)?;
        self.start_with(&command)
    }

    pub fn start_with(&mut self, command: &StartCommand) -> Result<MotorStatus, RigError> {
        if self.estop.is_engaged() {
            warn!("Cannot start: emergency stop is engaged");
            return Err(RigError::EmergencyStop);
        }
        info!(
            duty = command.duty(),
            ramp = command.ramp_multiplier(),
            direction = %command.direction(),
            "Starting motor"
        );
        self.command(MotorOpcode::Start, &command.payload())
    }

    pub fn stop(&mut self) -> Result<MotorStatus, RigError> {
        info!("Stopping motor");
        self.command(MotorOpcode::Stop, &[])
    }

    /// Engage the latch, then send EMERGENCY_STOP straight away.
    ///
    /// Any capture running on this session stops issuing frames at its next
    /// exchange. The latch stays engaged even if the send fails.
    pub fn emergency_stop(&mut self) -> Result<MotorStatus, RigError> {
        self.estop.engage();
        self.command(MotorOpcode::EmergencyStop, &[])
    }

    /// Record `num_samples` HLFB readings, wait for the capture to finish and
    /// download it.
    pub fn capture_hlfb(&mut self, num_samples: u32) -> Result<Vec<f32>, RigError> {
        let samples = u8::try_from(num_samples)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| RigError::out_of_range("num_samples", num_samples, "[1, 255]"))?;
        if self.estop.is_engaged() {
            return Err(RigError::EmergencyStop);
        }

        let result = self.record_and_download(samples);
        if matches!(result, Err(RigError::EmergencyStop)) {
            halt_after_abort(self.transport, self.config, "HLFB capture");
        }
        result
    }

    fn record_and_download(&mut self, samples: u8) -> Result<Vec<f32>, RigError> {
        let address = self.config.motor_address;
        info!(samples, "Recording HLFB");
        let request = Frame::encode(MotorOpcode::RecordHlfb.into(), &[samples])?;
        self.transport.write(address, &request)?;
        if !self.config.timing.write_settle.is_zero() {
            std::thread::sleep(self.config.timing.write_settle);
        }

        let total_bytes = poll_until(self.transport, address, &self.config.poll, self.estop, |frame| {
            match MotorStatus::from_primitive(frame.code()) {
                MotorStatus::HlfbCapturing => Ok(PollStep::Pending),
                MotorStatus::HlfbRecorded => Ok(PollStep::Done(frame.u16_le_at(2))),
                other => Err(RigError::UnexpectedStatus {
                    peripheral: "motor",
                    status: other.into(),
                }),
            }
        })?;
        if usize::from(total_bytes) != usize::from(samples) * 4 {
            warn!(total_bytes, samples, "HLFB byte count does not match requested samples");
        }

        let source = ChunkSource {
            address,
            opcode: MotorOpcode::ReadHlfbChunk.into(),
            chunk_status: MotorStatus::HlfbDataChunk.into(),
            settle: self.config.timing.chunk_settle,
        };
        let readings: Vec<f32> = download_samples(self.transport, &source, total_bytes, self.estop)?;
        info!(count = readings.len(), "HLFB capture complete");
        Ok(readings)
    }

    fn command(&mut self, opcode: MotorOpcode, payload: &[u8]) -> Result<MotorStatus, RigError> {
        let request = Frame::encode(opcode.into(), payload)?;
        let response = self
            .transport
            .exchange(self.config.motor_address, &request, self.config.timing.write_settle)?;
        let status = MotorStatus::from_primitive(response.code());
        if matches!(status, MotorStatus::Error | MotorStatus::Unknown(_)) {
            warn!(%opcode, status = format_args!("{:#04x}", response.code()), "Motor reported a problem");
        }
        Ok(status)
    }
}
