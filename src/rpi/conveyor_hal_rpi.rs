use log::debug;
use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::conveyor_hal::ConveyorHal;
use crate::fault::HardwareFault;

/// Discrete-signal conveyor backend: forward + enable outputs drive the motor
/// controller, the photoelectric sensor input reports object presence at the
/// pickup point.
pub struct ConveyorHalRpi {
    forward: OutputPin,
    enable: OutputPin,
    sensor: InputPin,
}

impl ConveyorHalRpi {
    pub fn new(forward_pin: u8, enable_pin: u8, sensor_pin: u8) -> Result<Self, HardwareFault> {
        let gpio = Gpio::new().map_err(gpio_fault)?;
        Ok(Self {
            forward: gpio.get(forward_pin).map_err(gpio_fault)?.into_output_low(),
            enable: gpio.get(enable_pin).map_err(gpio_fault)?.into_output_low(),
            sensor: gpio.get(sensor_pin).map_err(gpio_fault)?.into_input_pullup(),
        })
    }
}

impl ConveyorHal for ConveyorHalRpi {
    fn start(&mut self) -> Result<(), HardwareFault> {
        debug!("conveyor: start");
        self.forward.set_high();
        self.enable.set_high();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareFault> {
        debug!("conveyor: stop");
        self.forward.set_low();
        self.enable.set_low();
        Ok(())
    }

    fn object_present(&mut self) -> Result<bool, HardwareFault> {
        Ok(self.sensor.is_high())
    }
}

fn gpio_fault(e: rppal::gpio::Error) -> HardwareFault {
    HardwareFault::SignalIo(e.to_string())
}
