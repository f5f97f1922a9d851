pub mod arm_hal;
pub mod arm_hal_factory;
pub mod arm_hal_mock;
pub mod config;
pub mod conveyor_hal;
pub mod conveyor_hal_factory;
pub mod conveyor_hal_mock;
pub mod conveyor_hal_serial;
pub mod fault;
pub mod motion;
pub mod orchestrator;
pub mod surface;
pub mod vision;
pub mod zone;

mod rpi;
