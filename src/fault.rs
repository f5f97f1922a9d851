use std::time::Duration;
use thiserror::Error;

/// Raw signal or serial I/O failure at the hardware boundary. No retries
/// happen at this layer; the orchestrator's abort path is the recovery.
#[derive(Error, PartialEq, Clone, Debug)]
pub enum HardwareFault {
    #[error("device not connected: {0}")]
    DeviceNotConnected(String),
    #[error("signal i/o failed: {0}")]
    SignalIo(String),
    #[error("serial i/o failed: {0}")]
    SerialIo(String),
    #[error("camera failed: {0}")]
    Camera(String),
}

/// A commanded angle outside the calibrated range. Always fatal to the step,
/// never clamped: clamping would mask a miscalibration and the arm can do
/// physical damage.
#[derive(Error, PartialEq, Clone, Debug)]
#[error("joint {joint} commanded to {angle}° outside calibrated range [{min}°, {max}°]")]
pub struct LimitViolation {
    pub joint: usize,
    pub angle: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Error, PartialEq, Clone, Debug)]
pub enum MotionError {
    #[error(transparent)]
    Limit(#[from] LimitViolation),
    #[error(transparent)]
    Hardware(#[from] HardwareFault),
}

#[derive(Error, PartialEq, Clone, Debug)]
#[error("detector invocation failed: {0}")]
pub struct InferenceFault(pub String);

#[derive(Error, PartialEq, Clone, Debug)]
#[error("no object sensed at pickup point within {0:?}")]
pub struct ConveyorTimeout(pub Duration);

/// Invariant violation in startup configuration or calibration data. Detected
/// at load time and prevents orchestrator construction entirely.
#[derive(Error, PartialEq, Clone, Debug)]
pub enum ConfigError {
    #[error("joint {joint}: min angle {min}° must be below max angle {max}°")]
    BadJointLimit { joint: usize, min: f64, max: f64 },
    #[error("expected {expected} joint entries, got {actual}")]
    WrongJointCount { expected: usize, actual: usize },
    #[error("gripper open and closed angles must differ (both {0}°)")]
    GripperRangeEmpty(f64),
    #[error("position '{name}': {source}")]
    PositionOutOfRange {
        name: String,
        #[source]
        source: LimitViolation,
    },
    #[error("position '{name}' has {actual} angles, expected {expected}")]
    PositionWrongArity {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("missing predefined position '{0}'")]
    MissingPosition(String),
    #[error("duplicate pin {0} within one subsystem")]
    DuplicatePin(u8),
    #[error("serial endpoint identifier is empty")]
    EmptyEndpoint,
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Parse(String),
}

/// Any fault that aborts a cycle in flight.
#[derive(Error, PartialEq, Clone, Debug)]
pub enum CycleFault {
    #[error(transparent)]
    Hardware(#[from] HardwareFault),
    #[error(transparent)]
    Motion(#[from] MotionError),
    #[error(transparent)]
    Inference(#[from] InferenceFault),
    #[error(transparent)]
    ConveyorTimeout(#[from] ConveyorTimeout),
    #[error("abort requested by control surface")]
    AbortRequested,
}

impl CycleFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            CycleFault::Hardware(_) => FaultKind::Hardware,
            CycleFault::Motion(_) => FaultKind::Motion,
            CycleFault::Inference(_) => FaultKind::Inference,
            CycleFault::ConveyorTimeout(_) => FaultKind::ConveyorTimeout,
            CycleFault::AbortRequested => FaultKind::AbortRequested,
        }
    }
}

/// Bucketing key for cycle statistics.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FaultKind {
    Hardware,
    Motion,
    Inference,
    ConveyorTimeout,
    AbortRequested,
}
