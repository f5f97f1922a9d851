use log::debug;

use crate::arm_hal::{ArmCalibration, ArmHal, GripperAction, NUM_JOINTS};
use crate::fault::MotionError;

/// Simulated arm backend: commands only update an in-memory pose and report
/// success, so the rest of the system can run full cycles with no attached
/// hardware. Limit checks behave exactly as on the pulse backend.
#[derive(Debug)]
pub struct ArmHalMock {
    calibration: ArmCalibration,
    current_angles: [f64; NUM_JOINTS],
    gripper_angle: f64,
}

impl ArmHalMock {
    pub fn new(calibration: ArmCalibration) -> Self {
        let current_angles = calibration.home;
        let gripper_angle = calibration.gripper.open_deg;
        Self {
            calibration,
            current_angles,
            gripper_angle,
        }
    }

    pub fn current_angle(&self, joint: usize) -> f64 {
        self.current_angles[joint]
    }

    pub fn gripper_angle(&self) -> f64 {
        self.gripper_angle
    }
}

impl ArmHal for ArmHalMock {
    fn set_joint_angle(&mut self, joint: usize, angle_deg: f64) -> Result<(), MotionError> {
        self.calibration.limits.check(joint, angle_deg)?;
        debug!("sim arm: joint {joint} -> {angle_deg}°");
        self.current_angles[joint] = angle_deg;
        Ok(())
    }

    fn set_gripper(&mut self, action: GripperAction) -> Result<(), MotionError> {
        if let Some(angle) = self.calibration.gripper_angle(action) {
            debug!("sim arm: gripper {action:?} -> {angle}°");
            self.gripper_angle = angle;
        }
        Ok(())
    }

    fn home(&mut self) -> Result<(), MotionError> {
        debug!("sim arm: homing");
        for joint in 0..NUM_JOINTS {
            self.set_joint_angle(joint, self.calibration.home[joint])?;
        }
        Ok(())
    }
}
