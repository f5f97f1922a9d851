use std::time::Duration;

use crate::config::{ConveyorBackend, SystemConfig};
use crate::conveyor_hal::ConveyorHal;
use crate::conveyor_hal_mock::ConveyorHalMock;
use crate::conveyor_hal_serial::ConveyorHalSerial;
use crate::rpi::conveyor_hal_rpi::ConveyorHalRpi;

#[derive(Default)]
pub struct ConveyorHalFactory {
    force_mock: bool,
}

impl ConveyorHalFactory {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn new_maybe_mock(force_mock: bool) -> Self {
        Self { force_mock }
    }

    pub fn create_hal(
        &self,
        config: &SystemConfig,
    ) -> anyhow::Result<Box<dyn ConveyorHal + Send>> {
        if self.force_mock {
            return Ok(Box::new(ConveyorHalMock::default()));
        }
        match &config.hardware.conveyor {
            ConveyorBackend::Mock => Ok(Box::new(ConveyorHalMock::default())),
            ConveyorBackend::Gpio {
                forward_pin,
                enable_pin,
                sensor_pin,
            } => Ok(Box::new(ConveyorHalRpi::new(
                *forward_pin,
                *enable_pin,
                *sensor_pin,
            )?)),
            ConveyorBackend::Serial {
                port,
                baud,
                read_timeout_ms,
                assume_present_on_timeout,
            } => Ok(Box::new(ConveyorHalSerial::open(
                port,
                *baud,
                Duration::from_millis(*read_timeout_ms),
                *assume_present_on_timeout,
            )?)),
        }
    }
}
