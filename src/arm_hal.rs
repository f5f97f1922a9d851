use crate::config::{Calibration, GripperRange, JointLimits};
use crate::fault::{ConfigError, MotionError};

pub const NUM_JOINTS: usize = 6;

/// Uniform multi-joint positioning capability. Backend selection (real pulse
/// actuation vs. in-memory simulation) happens once at startup in
/// [`crate::arm_hal_factory::ArmHalFactory`]; nothing above this trait ever
/// branches on the backend kind.
///
/// Every implementation validates the commanded angle against the calibrated
/// [`JointLimits`] *before* issuing any hardware signal and fails closed with
/// a `LimitViolation` instead of clamping.
pub trait ArmHal {
    fn set_joint_angle(&mut self, joint: usize, angle_deg: f64) -> Result<(), MotionError>;
    fn set_gripper(&mut self, action: GripperAction) -> Result<(), MotionError>;
    fn home(&mut self) -> Result<(), MotionError>;
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum GripperAction {
    Open,
    Close,
    Hold,
}

/// The read-only slice of calibration every arm backend needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmCalibration {
    pub limits: JointLimits,
    pub gripper: GripperRange,
    pub home: [f64; NUM_JOINTS],
}

impl ArmCalibration {
    pub fn from_calibration(calibration: &Calibration) -> Result<Self, ConfigError> {
        Ok(Self {
            limits: calibration.joint_limits()?,
            gripper: calibration.gripper,
            home: calibration.position("home")?,
        })
    }

    pub fn gripper_angle(&self, action: GripperAction) -> Option<f64> {
        match action {
            GripperAction::Open => Some(self.gripper.open_deg),
            GripperAction::Close => Some(self.gripper.closed_deg),
            GripperAction::Hold => None,
        }
    }
}
