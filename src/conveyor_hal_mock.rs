use log::debug;

use crate::conveyor_hal::ConveyorHal;
use crate::fault::HardwareFault;

/// In-memory conveyor: the object "arrives" after a scripted number of sensor
/// polls while running. Lets full cycles run with no attached hardware.
#[derive(Debug)]
pub struct ConveyorHalMock {
    running: bool,
    polls_until_present: usize,
    polls_while_running: usize,
}

impl ConveyorHalMock {
    pub fn new(polls_until_present: usize) -> Self {
        Self {
            running: false,
            polls_until_present,
            polls_while_running: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for ConveyorHalMock {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ConveyorHal for ConveyorHalMock {
    fn start(&mut self) -> Result<(), HardwareFault> {
        debug!("sim conveyor: start");
        self.running = true;
        self.polls_while_running = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareFault> {
        debug!("sim conveyor: stop");
        self.running = false;
        Ok(())
    }

    fn object_present(&mut self) -> Result<bool, HardwareFault> {
        if self.running {
            self.polls_while_running += 1;
        }
        let present = self.polls_while_running >= self.polls_until_present;
        debug!("sim conveyor: object_present = {present}");
        Ok(present)
    }
}
