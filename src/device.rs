use crate::config::RigConfig;
use crate::encoder::Encoder;
use crate::estop::EmergencyStop;
use crate::motor::Motor;
use crate::transport::Transport;
use tracing::info;

/// One session with the rig: the bus, its configuration and the shared
/// emergency-stop latch.
///
/// The motor and encoder handles borrow the session mutably, so only one
/// operation can drive the bus at a time. A multi-threaded host should put
/// the whole `Rig` behind a mutex and hold the lock for a full operation,
/// never per frame; interleaved chunk requests would corrupt the download
/// offsets. Hand [`Rig::estop`] clones to threads that must be able to stop
/// the motor while the lock is held: a capture or download cut short by the
/// latch sends EMERGENCY_STOP to the motor before returning
/// [`RigError::EmergencyStop`](crate::error::RigError::EmergencyStop).
pub struct Rig<T: Transport> {
    transport: T,
    config: RigConfig,
    estop: EmergencyStop,
}

impl<T: Transport> Rig<T> {
    pub fn new(transport: T, config: RigConfig) -> Self {
        Self::with_estop(transport, config, EmergencyStop::new())
    }

    /// Use an existing latch, e.g. one already wired to a GPIO interrupt.
    pub fn with_estop(transport: T, config: RigConfig, estop: EmergencyStop) -> Self {
        info!(
            motor = format_args!("{:#04x}", config.motor_address),
            encoder = format_args!("{:#04x}", config.encoder_address),
            "Rig session opened"
        );
        Self {
            transport,
            config,
            estop,
        }
    }

    pub fn motor(&mut self) -> Motor<'_, T> {
        Motor::new(&mut self.transport, &self.config, &self.estop)
    }

    pub fn encoder(&mut self) -> Encoder<'_, T> {
        Encoder::new(&mut self.transport, &self.config, &self.estop)
    }

    pub fn estop(&self) -> &EmergencyStop {
        &self.estop
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
