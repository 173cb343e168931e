//! # Rig bus vocabulary
//!
//! Both peripherals sit on one shared bus at fixed addresses and speak the
//! same 6-byte framing (see [`crate::frame`]). Each peripheral has its own
//! opcode namespace for host requests and its own status namespace for
//! replies. The values are firmware constants.
//!
//! ## Motor peripheral
//!
//! Drives the stepper/servo and samples its High-Level FeedBack (HLFB) line.
//! After `RecordHlfb` the peripheral replies `HlfbCapturing` until the
//! capture completes, then `HlfbRecorded` with the sample count in byte 1 and
//! the byte count in bytes 2-3 (low byte first).
//!
//! ## Encoder peripheral
//!
//! Latches shaft-encoder positions on an external trigger. After `Record`
//! it replies `Capturing` until armed samples are collected, then `Ready`
//! with the byte count in bytes 1-2 (low byte first).

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display;

/// Default bus address of the motor peripheral.
pub const MOTOR_ADDR: u8 = 0x08;

/// Default bus address of the encoder peripheral.
pub const ENCODER_ADDR: u8 = 0x60;

/// Sample count the encoder is armed with when the caller gives none.
pub const DEFAULT_ARM_SAMPLES: u8 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Display)]
#[repr(u8)]
pub enum MotorOpcode {
    Start = 0x01,
    Stop = 0x02,
    RecordHlfb = 0x03,
    ReadHlfbChunk = 0x04,
    EmergencyStop = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive, Display, Serialize)]
#[repr(u8)]
pub enum MotorStatus {
    Running = 0x11,
    Stopped = 0x12,
    HlfbRecorded = 0x13,
    HlfbCapturing = 0x14,
    HlfbDataChunk = 0x15,

    #[num_enum(catch_all)]
    Unknown(u8),

    Error = 0xFF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Display)]
#[repr(u8)]
pub enum EncoderOpcode {
    Record = 0x21,
    ReadChunk = 0x22,
    SingleShot = 0x23,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive, Display, Serialize)]
#[repr(u8)]
pub enum EncoderStatus {
    Idle = 0x31,
    Capturing = 0x32,
    Ready = 0x33,
    Chunk = 0x34,
    SingleShotReady = 0x35,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Shaft rotation direction, sent as byte 4 of the START frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Cw,
    Ccw,
}

impl Direction {
    pub fn as_bit(self) -> u8 {
        match self {
            Direction::Cw => 0,
            Direction::Ccw => 1,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cw" => Ok(Direction::Cw),
            "ccw" => Ok(Direction::Ccw),
            other => Err(format!("unknown direction '{other}', expected cw or ccw")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_kept() {
        assert_eq!(MotorStatus::from_primitive(0x13), MotorStatus::HlfbRecorded);
        assert_eq!(MotorStatus::from_primitive(0x42), MotorStatus::Unknown(0x42));
        assert_eq!(EncoderStatus::from_primitive(0x35), EncoderStatus::SingleShotReady);
        assert_eq!(EncoderStatus::from_primitive(0x11), EncoderStatus::Unknown(0x11));
        assert_eq!(u8::from(EncoderStatus::Unknown(0x11)), 0x11);
    }

    #[test]
    fn motor_error_code_round_trips() {
        assert_eq!(MotorStatus::from_primitive(0xFF), MotorStatus::Error);
        assert_eq!(u8::from(MotorStatus::Error), 0xFF);
        assert_eq!(MotorStatus::from_primitive(0x16), MotorStatus::Unknown(0x16));
        assert_eq!(u8::from(MotorStatus::Unknown(0xFE)), 0xFE);
    }

    #[test]
    fn opcodes_match_firmware() {
        assert_eq!(u8::from(MotorOpcode::Start), 1);
        assert_eq!(u8::from(MotorOpcode::EmergencyStop), 5);
        assert_eq!(u8::from(EncoderOpcode::Record), 0x21);
        assert_eq!(u8::from(EncoderOpcode::SingleShot), 0x23);
        assert_eq!(MotorOpcode::try_from(4u8).ok(), Some(MotorOpcode::ReadHlfbChunk));
        assert!(EncoderOpcode::try_from(0x24u8).is_err());
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("CCW".parse::<Direction>().unwrap(), Direction::Ccw);
        assert_eq!(Direction::Cw.to_string(), "cw");
        assert_eq!(Direction::Ccw.as_bit(), 1);
        assert!("up".parse::<Direction>().is_err());
    }
}
