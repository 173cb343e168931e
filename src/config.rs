use crate::protocol::{ENCODER_ADDR, MOTOR_ADDR};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Bus addresses and timing for one rig session.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub motor_address: u8,
    pub encoder_address: u8,
    pub timing: Timing,
    pub poll: PollPolicy,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            motor_address: MOTOR_ADDR,
            encoder_address: ENCODER_ADDR,
            timing: Timing::default(),
            poll: PollPolicy::default(),
        }
    }
}

impl RigConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Default addresses with every delay set to zero.
    pub fn instant() -> Self {
        Self {
            timing: Timing::instant(),
            poll: PollPolicy {
                interval: Duration::ZERO,
                ..PollPolicy::default()
            },
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fixed write-to-read settle delays. The peripherals need time to act on a
/// write before the paired read returns meaningful data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    #[serde(with = "millis")]
    pub write_settle: Duration,
    #[serde(with = "millis")]
    pub chunk_settle: Duration,
    #[serde(with = "millis")]
    pub arm_settle: Duration,
    #[serde(with = "millis")]
    pub single_shot_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            write_settle: Duration::from_millis(10),
            chunk_settle: Duration::from_millis(5),
            arm_settle: Duration::from_millis(100),
            single_shot_settle: Duration::from_millis(10),
        }
    }
}

impl Timing {
    pub fn instant() -> Self {
        Self {
            write_settle: Duration::ZERO,
            chunk_settle: Duration::ZERO,
            arm_settle: Duration::ZERO,
            single_shot_settle: Duration::ZERO,
        }
    }
}

/// Bounds on how long the poll loop waits for a peripheral to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    #[serde(with = "millis")]
    pub interval: Duration,
    pub max_attempts: u32,
    #[serde(with = "millis::option")]
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 600,
            deadline: None,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn to_millis<E: serde::ser::Error>(value: &Duration) -> Result<u64, E> {
        u64::try_from(value.as_millis()).map_err(|_| E::custom(format!("{value:?} does not fit in u64 milliseconds")))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis::<S::Error>(value)?)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&super::to_millis::<S::Error>(d)?),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RigConfig =
            serde_json::from_str(r#"{ "encoder_address": 97, "poll": { "max_attempts": 5, "deadline": 250 } }"#)
                .unwrap();
        assert_eq!(config.encoder_address, 97);
        assert_eq!(config.motor_address, MOTOR_ADDR);
        assert_eq!(config.poll.max_attempts, 5);
        assert_eq!(config.poll.deadline, Some(Duration::from_millis(250)));
        assert_eq!(config.poll.interval, Duration::from_millis(100));
        assert_eq!(config.timing, Timing::default());
    }

    #[test]
    fn durations_serialize_as_millis() {
        let json = serde_json::to_value(Timing::default()).unwrap();
        assert_eq!(json["arm_settle"], 100);
        assert_eq!(json["chunk_settle"], 5);
    }

    #[test]
    fn oversized_duration_fails_to_serialize() {
        let timing = Timing {
            arm_settle: Duration::MAX,
            ..Timing::default()
        };
        assert!(serde_json::to_string(&timing).is_err());

        let poll = PollPolicy {
            deadline: Some(Duration::MAX),
            ..PollPolicy::default()
        };
        assert!(serde_json::to_string(&poll).is_err());
    }
}
