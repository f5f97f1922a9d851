use crate::fault::HardwareFault;

/// Uniform conveyor motion-control capability over the discrete-signal and
/// serial-command backends. `object_present` must never block indefinitely:
/// every read has a bounded wait and returns a definite boolean. Failures
/// propagate as [`HardwareFault`]; no retries at this layer.
pub trait ConveyorHal {
    fn start(&mut self) -> Result<(), HardwareFault>;
    fn stop(&mut self) -> Result<(), HardwareFault>;
    fn object_present(&mut self) -> Result<bool, HardwareFault>;
}
