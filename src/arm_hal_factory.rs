use crate::arm_hal::{ArmCalibration, ArmHal};
use crate::arm_hal_mock::ArmHalMock;
use crate::config::{ArmBackend, SystemConfig};
use crate::rpi::arm_hal_rpi::ArmHalRpi;

#[derive(Default)]
pub struct ArmHalFactory {
    force_mock: bool,
}

impl ArmHalFactory {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn new_maybe_mock(force_mock: bool) -> Self {
        Self { force_mock }
    }

    /// Backend selection happens exactly once, here, from configuration.
    pub fn create_hal(&self, config: &SystemConfig) -> anyhow::Result<Box<dyn ArmHal + Send>> {
        let calibration = ArmCalibration::from_calibration(&config.calibration)?;
        match &config.hardware.arm {
            ArmBackend::Pwm {
                joint_pins,
                gripper_pin,
            } if !self.force_mock => Ok(Box::new(ArmHalRpi::new(
                calibration,
                *joint_pins,
                *gripper_pin,
            )?)),
            _ => Ok(Box::new(ArmHalMock::new(calibration))),
        }
    }
}
