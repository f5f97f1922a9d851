use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arm_hal::NUM_JOINTS;
use crate::fault::{ConfigError, LimitViolation};

/// Immutable process-wide configuration, loaded once at startup and passed by
/// reference to every component that needs it. Calibration data is untrusted
/// external input: every invariant is checked in [`SystemConfig::validate`]
/// and a violation is a fatal startup error, not a recoverable one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub hardware: HardwareConfig,
    pub calibration: Calibration,
    pub vision: VisionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub arm: ArmBackend,
    pub conveyor: ConveyorBackend,
}

/// Exactly one arm backend kind is selected per process; the enum makes a
/// second selection unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArmBackend {
    Simulated,
    Pwm {
        joint_pins: [u8; NUM_JOINTS],
        gripper_pin: u8,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConveyorBackend {
    Mock,
    Gpio {
        forward_pin: u8,
        enable_pin: u8,
        sensor_pin: u8,
    },
    Serial {
        port: String,
        baud: u32,
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
        /// Degraded-mode policy: when the sensor acknowledgment cannot be
        /// confirmed within the read timeout, report the object as present so
        /// the pipeline can make progress.
        #[serde(default = "default_assume_present")]
        assume_present_on_timeout: bool,
    },
}

fn default_read_timeout_ms() -> u64 {
    250
}

fn default_assume_present() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    pub joint_limits: Vec<JointLimit>,
    pub gripper: GripperRange,
    pub positions: HashMap<String, Vec<f64>>,
    pub zone_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min_deg: f64,
    pub max_deg: f64,
}

/// Open may be numerically above or below closed; they only have to differ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GripperRange {
    pub open_deg: f64,
    pub closed_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Exclusive threshold: a detection counts only when its confidence is
    /// strictly greater than this value.
    pub confidence_threshold: f64,
    #[serde(default)]
    pub preprocess: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub conveyor_max_wait_ms: u64,
    pub conveyor_poll_interval_ms: u64,
    pub trigger_poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            conveyor_max_wait_ms: 10_000,
            conveyor_poll_interval_ms: 50,
            trigger_poll_interval_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn conveyor_max_wait(&self) -> Duration {
        Duration::from_millis(self.conveyor_max_wait_ms)
    }

    pub fn conveyor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.conveyor_poll_interval_ms)
    }

    pub fn trigger_poll_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_poll_interval_ms)
    }
}

/// Validated per-joint angle limits, shared read-only by every arm backend.
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimits([JointLimit; NUM_JOINTS]);

impl JointLimits {
    pub fn check(&self, joint: usize, angle_deg: f64) -> Result<(), LimitViolation> {
        let limit = self.0[joint];
        if angle_deg < limit.min_deg || angle_deg > limit.max_deg {
            return Err(LimitViolation {
                joint,
                angle: angle_deg,
                min: limit.min_deg,
                max: limit.max_deg,
            });
        }
        Ok(())
    }
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: SystemConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hardware.validate()?;
        self.calibration.validate()?;
        Ok(())
    }

    /// Built-in simulated-backend configuration: four sorting zones, the
    /// standard 500-2500us hobby servo span, no hardware required.
    pub fn demo() -> Self {
        let positions: HashMap<String, Vec<f64>> = [
            ("home", vec![90.0, 90.0, 90.0, 90.0, 90.0, 90.0]),
            ("pickup_approach", vec![90.0, 110.0, 60.0, 90.0, 90.0, 90.0]),
            ("pickup", vec![90.0, 120.0, 45.0, 90.0, 90.0, 90.0]),
            ("zone1_drop", vec![30.0, 110.0, 60.0, 90.0, 90.0, 90.0]),
            ("zone2_drop", vec![60.0, 110.0, 60.0, 90.0, 90.0, 90.0]),
            ("zone3_drop", vec![120.0, 110.0, 60.0, 90.0, 90.0, 90.0]),
            ("zone4_drop", vec![150.0, 110.0, 60.0, 90.0, 90.0, 90.0]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();

        let zone_map: HashMap<String, String> = [
            ("defect_A", "zone1"),
            ("defect_B", "zone2"),
            ("defect_C", "zone3"),
            ("ok", "zone4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        Self {
            hardware: HardwareConfig {
                arm: ArmBackend::Simulated,
                conveyor: ConveyorBackend::Mock,
            },
            calibration: Calibration {
                joint_limits: vec![
                    JointLimit {
                        min_deg: 0.0,
                        max_deg: 180.0,
                    };
                    NUM_JOINTS
                ],
                gripper: GripperRange {
                    open_deg: 60.0,
                    closed_deg: 120.0,
                },
                positions,
                zone_map,
            },
            vision: VisionConfig {
                confidence_threshold: 0.5,
                preprocess: false,
            },
            timing: TimingConfig::default(),
        }
    }
}

impl HardwareConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let ArmBackend::Pwm {
            joint_pins,
            gripper_pin,
        } = &self.arm
        {
            let mut pins = joint_pins.to_vec();
            pins.push(*gripper_pin);
            check_distinct(&pins)?;
        }
        match &self.conveyor {
            ConveyorBackend::Gpio {
                forward_pin,
                enable_pin,
                sensor_pin,
            } => check_distinct(&[*forward_pin, *enable_pin, *sensor_pin])?,
            ConveyorBackend::Serial { port, .. } => {
                if port.is_empty() {
                    return Err(ConfigError::EmptyEndpoint);
                }
            }
            ConveyorBackend::Mock => {}
        }
        Ok(())
    }
}

fn check_distinct(pins: &[u8]) -> Result<(), ConfigError> {
    for (i, pin) in pins.iter().enumerate() {
        if pins[i + 1..].contains(pin) {
            return Err(ConfigError::DuplicatePin(*pin));
        }
    }
    Ok(())
}

impl Calibration {
    fn validate(&self) -> Result<(), ConfigError> {
        let limits = self.joint_limits()?;
        if self.gripper.open_deg == self.gripper.closed_deg {
            return Err(ConfigError::GripperRangeEmpty(self.gripper.open_deg));
        }
        for (name, angles) in &self.positions {
            if angles.len() != NUM_JOINTS {
                return Err(ConfigError::PositionWrongArity {
                    name: name.clone(),
                    expected: NUM_JOINTS,
                    actual: angles.len(),
                });
            }
            for (joint, angle) in angles.iter().enumerate() {
                limits
                    .check(joint, *angle)
                    .map_err(|source| ConfigError::PositionOutOfRange {
                        name: name.clone(),
                        source,
                    })?;
            }
        }
        for required in ["home", "pickup_approach", "pickup"] {
            if !self.positions.contains_key(required) {
                return Err(ConfigError::MissingPosition(required.to_owned()));
            }
        }
        for zone in self.zone_map.values() {
            let drop_name = format!("{zone}_drop");
            if !self.positions.contains_key(&drop_name) {
                return Err(ConfigError::MissingPosition(drop_name));
            }
        }
        Ok(())
    }

    pub fn joint_limits(&self) -> Result<JointLimits, ConfigError> {
        let entries: [JointLimit; NUM_JOINTS] = self
            .joint_limits
            .clone()
            .try_into()
            .map_err(|v: Vec<JointLimit>| ConfigError::WrongJointCount {
                expected: NUM_JOINTS,
                actual: v.len(),
            })?;
        for (joint, limit) in entries.iter().enumerate() {
            if limit.min_deg >= limit.max_deg {
                return Err(ConfigError::BadJointLimit {
                    joint,
                    min: limit.min_deg,
                    max: limit.max_deg,
                });
            }
        }
        Ok(JointLimits(entries))
    }

    pub fn position(&self, name: &str) -> Result<[f64; NUM_JOINTS], ConfigError> {
        let angles = self
            .positions
            .get(name)
            .ok_or_else(|| ConfigError::MissingPosition(name.to_owned()))?;
        angles
            .clone()
            .try_into()
            .map_err(|v: Vec<f64>| ConfigError::PositionWrongArity {
                name: name.to_owned(),
                expected: NUM_JOINTS,
                actual: v.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_config_is_valid() {
        SystemConfig::demo().validate().unwrap();
    }

    #[test]
    fn test_demo_config_roundtrips_through_json() {
        let demo = SystemConfig::demo();
        let json = serde_json::to_string_pretty(&demo).unwrap();
        let parsed: SystemConfig = serde_json::from_str(&json).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.calibration.zone_map, demo.calibration.zone_map);
    }

    #[test]
    fn test_inverted_joint_limit_is_fatal() {
        let mut config = SystemConfig::demo();
        config.calibration.joint_limits[2] = JointLimit {
            min_deg: 90.0,
            max_deg: 10.0,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BadJointLimit {
                joint: 2,
                min: 90.0,
                max: 10.0,
            })
        );
    }

    #[test]
    fn test_position_outside_limits_is_fatal() {
        let mut config = SystemConfig::demo();
        config
            .calibration
            .positions
            .insert("pickup".to_owned(), vec![90.0, 200.0, 90.0, 90.0, 90.0, 90.0]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_zone_without_drop_position_is_fatal() {
        let mut config = SystemConfig::demo();
        config
            .calibration
            .zone_map
            .insert("defect_X".to_owned(), "zone9".to_owned());
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingPosition("zone9_drop".to_owned()))
        );
    }

    #[test]
    fn test_duplicate_pins_within_subsystem_rejected() {
        let mut config = SystemConfig::demo();
        config.hardware.conveyor = ConveyorBackend::Gpio {
            forward_pin: 17,
            enable_pin: 17,
            sensor_pin: 22,
        };
        assert_eq!(config.validate(), Err(ConfigError::DuplicatePin(17)));
    }

    #[test]
    fn test_gripper_range_must_not_be_empty() {
        let mut config = SystemConfig::demo();
        config.calibration.gripper = GripperRange {
            open_deg: 45.0,
            closed_deg: 45.0,
        };
        assert_eq!(config.validate(), Err(ConfigError::GripperRangeEmpty(45.0)));
    }
}
