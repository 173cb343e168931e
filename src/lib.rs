pub mod config;
pub mod device;
pub mod emulator;
pub mod encoder;
pub mod error;
pub mod estop;
pub mod frame;
pub mod motor;
pub mod protocol;
pub mod transfer;
pub mod transport;

// Re-export the session types for easy access
pub use config::RigConfig;
pub use device::Rig;
pub use emulator::EmulatedTransport;
pub use error::{RigError, TransportError};
pub use estop::EmergencyStop;
pub use transport::Transport;
