use std::time::Duration;

use conv::{ConvUtil, RoundToNearest};
use log::debug;
use rppal::gpio::{Gpio, OutputPin};

use crate::arm_hal::{ArmCalibration, ArmHal, GripperAction, NUM_JOINTS};
use crate::fault::{HardwareFault, MotionError};

/// Direct pulse-width arm backend: each servo is driven by software PWM on
/// its own GPIO pin. The commanded angle is mapped linearly onto the servo's
/// physical pulse span; limit validation happens before any signal is issued.
pub struct ArmHalRpi {
    calibration: ArmCalibration,
    joints: [OutputPin; NUM_JOINTS],
    gripper: OutputPin,
}

impl ArmHalRpi {
    /// Standard 50 Hz hobby servo frame.
    const PWM_PERIOD: Duration = Duration::from_millis(20);
    // MG996R-class servos: 500us..2500us maps onto the 0°..180° span.
    const MIN_PULSE_US: f64 = 500.0;
    const MAX_PULSE_US: f64 = 2500.0;
    const SPAN_MIN_DEG: f64 = 0.0;
    const SPAN_MAX_DEG: f64 = 180.0;

    pub fn new(
        calibration: ArmCalibration,
        joint_pins: [u8; NUM_JOINTS],
        gripper_pin: u8,
    ) -> Result<Self, HardwareFault> {
        let gpio = Gpio::new().map_err(gpio_fault)?;
        let mut joints = Vec::with_capacity(NUM_JOINTS);
        for pin in joint_pins {
            joints.push(claim_output(&gpio, pin)?);
        }
        let joints: [OutputPin; NUM_JOINTS] = joints
            .try_into()
            .map_err(|_| HardwareFault::SignalIo("claimed wrong number of joint pins".into()))?;
        let gripper = claim_output(&gpio, gripper_pin)?;
        Ok(Self {
            calibration,
            joints,
            gripper,
        })
    }

    fn pulse_width_for(angle_deg: f64) -> Result<Duration, HardwareFault> {
        let fraction =
            (angle_deg - Self::SPAN_MIN_DEG) / (Self::SPAN_MAX_DEG - Self::SPAN_MIN_DEG);
        let pulse_us = Self::MIN_PULSE_US + fraction * (Self::MAX_PULSE_US - Self::MIN_PULSE_US);
        let pulse_us: u64 = pulse_us
            .approx_as_by::<u64, RoundToNearest>()
            .map_err(|e| HardwareFault::SignalIo(format!("pulse width conversion: {e}")))?;
        Ok(Duration::from_micros(pulse_us))
    }

    fn issue_pulse(pin: &mut OutputPin, angle_deg: f64) -> Result<(), HardwareFault> {
        let pulse = Self::pulse_width_for(angle_deg)?;
        pin.set_pwm(Self::PWM_PERIOD, pulse).map_err(gpio_fault)
    }
}

impl ArmHal for ArmHalRpi {
    fn set_joint_angle(&mut self, joint: usize, angle_deg: f64) -> Result<(), MotionError> {
        self.calibration.limits.check(joint, angle_deg)?;
        debug!("arm: joint {joint} -> {angle_deg}°");
        Self::issue_pulse(&mut self.joints[joint], angle_deg)?;
        Ok(())
    }

    fn set_gripper(&mut self, action: GripperAction) -> Result<(), MotionError> {
        if let Some(angle) = self.calibration.gripper_angle(action) {
            debug!("arm: gripper {action:?} -> {angle}°");
            Self::issue_pulse(&mut self.gripper, angle)?;
        }
        Ok(())
    }

    fn home(&mut self) -> Result<(), MotionError> {
        debug!("arm: homing");
        for joint in 0..NUM_JOINTS {
            let angle = self.calibration.home[joint];
            self.set_joint_angle(joint, angle)?;
        }
        Ok(())
    }
}

fn claim_output(gpio: &Gpio, pin: u8) -> Result<OutputPin, HardwareFault> {
    Ok(gpio.get(pin).map_err(gpio_fault)?.into_output_low())
}

fn gpio_fault(e: rppal::gpio::Error) -> HardwareFault {
    HardwareFault::SignalIo(e.to_string())
}
