use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::SerialPort;

use crate::conveyor_hal::ConveyorHal;
use crate::fault::HardwareFault;

const CMD_START: &[u8] = b"FWD\n";
const CMD_STOP: &[u8] = b"STOP\n";
const CMD_SENSE: &[u8] = b"SENSE\n";

/// Serial-command conveyor backend. Start/stop are fixed command strings;
/// presence sensing polls the controller and waits at most the configured
/// read timeout for the one-byte reply. A timed-out read falls back to the
/// configured degraded-mode answer instead of blocking the pipeline.
pub struct ConveyorHalSerial {
    port: Box<dyn SerialPort>,
    assume_present_on_timeout: bool,
}

impl ConveyorHalSerial {
    pub fn open(
        path: &str,
        baud: u32,
        read_timeout: Duration,
        assume_present_on_timeout: bool,
    ) -> Result<Self, HardwareFault> {
        let port = serialport::new(path, baud)
            .timeout(read_timeout)
            .open()
            .map_err(|e| HardwareFault::DeviceNotConnected(format!("{path}: {e}")))?;
        Ok(Self {
            port,
            assume_present_on_timeout,
        })
    }

    fn send(&mut self, command: &[u8]) -> Result<(), HardwareFault> {
        self.port.write_all(command).map_err(serial_fault)?;
        self.port.flush().map_err(serial_fault)?;
        Ok(())
    }
}

impl ConveyorHal for ConveyorHalSerial {
    fn start(&mut self) -> Result<(), HardwareFault> {
        debug!("conveyor(serial): start");
        self.send(CMD_START)
    }

    fn stop(&mut self) -> Result<(), HardwareFault> {
        debug!("conveyor(serial): stop");
        self.send(CMD_STOP)
    }

    fn object_present(&mut self) -> Result<bool, HardwareFault> {
        self.send(CMD_SENSE)?;
        let mut reply = [0u8; 1];
        match self.port.read(&mut reply) {
            Ok(n) if n > 0 => Ok(reply[0] == b'1'),
            Ok(_) => Ok(self.assume_present_on_timeout),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                warn!(
                    "conveyor(serial): no sensor reply, degraded mode answers {}",
                    self.assume_present_on_timeout
                );
                Ok(self.assume_present_on_timeout)
            }
            Err(e) => Err(serial_fault(e)),
        }
    }
}

fn serial_fault(e: std::io::Error) -> HardwareFault {
    HardwareFault::SerialIo(e.to_string())
}
