pub mod arm_hal_rpi;
pub mod conveyor_hal_rpi;
