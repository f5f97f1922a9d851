use std::collections::HashMap;
use std::time::Duration;

use derive_new::new;
use log::debug;

use crate::arm_hal::{ArmHal, GripperAction, NUM_JOINTS};
use crate::config::Calibration;
use crate::fault::{ConfigError, MotionError};

/// Settle delays let mechanical vibration die out before the next command.
const SETTLE_MOVE: Duration = Duration::from_millis(500);
// Grip and release get a little longer so the object has actually seated or
// dropped before the arm moves on.
const SETTLE_GRIP: Duration = Duration::from_millis(700);

#[derive(Debug, Clone, PartialEq, new)]
pub struct GestureStep {
    pub angles: [f64; NUM_JOINTS],
    pub gripper: GripperAction,
    pub settle: Duration,
    /// Actuate the gripper before the joints for this step. Default ordering
    /// is joints-then-gripper; some servo timings need the reverse.
    pub gripper_first: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gesture {
    pub name: String,
    pub steps: Vec<GestureStep>,
}

/// Named, safety-checked gestures composed once at startup from the
/// calibrated predefined positions. Read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureLibrary {
    pub pickup: Gesture,
    pub home: Gesture,
    place_in_zone: HashMap<String, Gesture>,
}

impl GestureLibrary {
    pub fn build(calibration: &Calibration) -> Result<Self, ConfigError> {
        let approach = calibration.position("pickup_approach")?;
        let pickup_pos = calibration.position("pickup")?;
        let home_pos = calibration.position("home")?;

        let pickup = Gesture {
            name: "pickup".to_owned(),
            steps: vec![
                GestureStep::new(approach, GripperAction::Open, SETTLE_MOVE, false),
                GestureStep::new(pickup_pos, GripperAction::Close, SETTLE_GRIP, false),
                GestureStep::new(approach, GripperAction::Hold, SETTLE_MOVE, false),
            ],
        };

        let mut place_in_zone = HashMap::new();
        for zone in calibration.zone_map.values() {
            let drop_pos = calibration.position(&format!("{zone}_drop"))?;
            place_in_zone.insert(
                zone.clone(),
                Gesture {
                    name: format!("place_in_{zone}"),
                    steps: vec![GestureStep::new(
                        drop_pos,
                        GripperAction::Open,
                        SETTLE_GRIP,
                        false,
                    )],
                },
            );
        }

        let home = Gesture {
            name: "home".to_owned(),
            steps: vec![GestureStep::new(
                home_pos,
                GripperAction::Hold,
                SETTLE_MOVE,
                false,
            )],
        };

        Ok(Self {
            pickup,
            home,
            place_in_zone,
        })
    }

    pub fn place_for(&self, zone: &str) -> Option<&Gesture> {
        self.place_in_zone.get(zone)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum GestureRun {
    Completed,
    Cancelled,
}

/// Runs gesture steps strictly in order. Joints within a step are issued
/// smallest-index-first so transient configurations stay deterministic. Halts
/// on the first error with no rollback; the arm holds its last commanded pose
/// and recovery is the orchestrator's job.
pub struct MotionSequencer {
    hal: Box<dyn ArmHal + Send>,
}

impl MotionSequencer {
    pub fn new(hal: Box<dyn ArmHal + Send>) -> Self {
        Self { hal }
    }

    pub fn hal_mut(&mut self) -> &mut (dyn ArmHal + Send) {
        &mut *self.hal
    }

    pub async fn execute(&mut self, gesture: &Gesture) -> Result<(), MotionError> {
        self.execute_with_cancel(gesture, || false).await.map(|_| ())
    }

    /// Cancellation is honoured between steps only; interrupting a servo
    /// mid-pulse is unsafe, so a step in flight always completes.
    pub async fn execute_with_cancel(
        &mut self,
        gesture: &Gesture,
        cancelled: impl Fn() -> bool,
    ) -> Result<GestureRun, MotionError> {
        debug!(
            "executing gesture '{}' ({} steps)",
            gesture.name,
            gesture.steps.len()
        );
        for (i, step) in gesture.steps.iter().enumerate() {
            if cancelled() {
                debug!("gesture '{}' cancelled before step {i}", gesture.name);
                return Ok(GestureRun::Cancelled);
            }
            if step.gripper_first {
                self.hal.set_gripper(step.gripper)?;
            }
            for joint in 0..NUM_JOINTS {
                self.hal.set_joint_angle(joint, step.angles[joint])?;
            }
            if !step.gripper_first {
                self.hal.set_gripper(step.gripper)?;
            }
            tokio::time::sleep(step.settle).await;
        }
        Ok(GestureRun::Completed)
    }
}
