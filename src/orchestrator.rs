use std::sync::Arc;

use futures_signals::signal::Mutable;
use log::{info, warn};

use crate::config::{SystemConfig, TimingConfig};
use crate::conveyor_hal::ConveyorHal;
use crate::fault::{ConfigError, ConveyorTimeout, CycleFault, FaultKind};
use crate::motion::{Gesture, GestureLibrary, GestureRun, MotionSequencer};
use crate::surface::{Snapshot, SurfaceHandle, SurfaceShared, TriggerSource};
use crate::vision::{self, FrameSource, VisionAdapter};
use crate::zone::{self, ZoneDecision, ZoneMap};

/// One cycle's state. Owned exclusively by the orchestrator worker; the
/// control surface only ever sees it through published snapshots.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum CycleState {
    Idle,
    Triggered,
    Capturing,
    Inferring,
    Deciding,
    Conveying,
    Picking,
    Placing,
    Homing,
    Aborting,
}

/// Outcome counters, bucketed by fault kind for failures. Exposed to, never
/// mutated by, the control surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles_started: u64,
    pub successes: u64,
    pub no_match: u64,
    pub hardware_faults: u64,
    pub motion_faults: u64,
    pub inference_faults: u64,
    pub conveyor_timeouts: u64,
    pub aborts_requested: u64,
}

impl CycleStats {
    fn record_fault(&mut self, kind: FaultKind) {
        match kind {
            FaultKind::Hardware => self.hardware_faults += 1,
            FaultKind::Motion => self.motion_faults += 1,
            FaultKind::Inference => self.inference_faults += 1,
            FaultKind::ConveyorTimeout => self.conveyor_timeouts += 1,
            FaultKind::AbortRequested => self.aborts_requested += 1,
        }
    }
}

enum CycleOutcome {
    Sorted(ZoneDecision),
    NoMatch,
}

/// Drives one full inspection/sort cycle at a time:
/// trigger -> capture -> infer -> decide -> convey -> pick -> place -> home.
/// Runs on its own worker so hardware waits never stall the control surface.
/// Exactly one instance runs; a trigger arriving mid-cycle is dropped, not
/// queued, since the line has one conveyor and one arm.
pub struct Orchestrator {
    camera: Box<dyn FrameSource + Send>,
    vision: VisionAdapter,
    zone_map: ZoneMap,
    confidence_threshold: f64,
    conveyor: Box<dyn ConveyorHal + Send>,
    sequencer: MotionSequencer,
    gestures: GestureLibrary,
    timing: TimingConfig,
    shared: Arc<SurfaceShared>,
    snapshot: Mutable<Snapshot>,
    state: CycleState,
    stats: CycleStats,
}

impl Orchestrator {
    /// Fails with [`ConfigError`] on any calibration invariant violation;
    /// a misconfigured orchestrator must never come into existence.
    pub fn new(
        config: &SystemConfig,
        camera: Box<dyn FrameSource + Send>,
        vision: VisionAdapter,
        conveyor: Box<dyn ConveyorHal + Send>,
        sequencer: MotionSequencer,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let gestures = GestureLibrary::build(&config.calibration)?;
        Ok(Self {
            camera,
            vision,
            zone_map: config.calibration.zone_map.clone(),
            confidence_threshold: config.vision.confidence_threshold,
            conveyor,
            sequencer,
            gestures,
            timing: config.timing.clone(),
            shared: Arc::new(SurfaceShared::default()),
            snapshot: Mutable::new(Snapshot::default()),
            state: CycleState::Idle,
            stats: CycleStats::default(),
        })
    }

    pub fn shared(&self) -> Arc<SurfaceShared> {
        self.shared.clone()
    }

    /// Moves the orchestrator onto its dedicated worker task and returns the
    /// bridge handle the control surface talks to.
    pub fn spawn(self, trigger: Box<dyn TriggerSource + Send>) -> SurfaceHandle {
        let shared = self.shared.clone();
        let snapshot = self.snapshot.clone();
        let join_handle = tokio::spawn(self.run(trigger));
        SurfaceHandle::new(shared, snapshot, join_handle)
    }

    async fn run(mut self, mut trigger: Box<dyn TriggerSource + Send>) {
        info!("orchestrator worker started");
        while !self.shared.is_shutdown() {
            if self.shared.is_enabled() && trigger.has_trigger() {
                self.run_cycle().await;
                // One conveyor, one arm: anything triggered while the cycle
                // was in flight is rejected, not queued.
                self.shared.take_trigger();
            } else {
                tokio::time::sleep(self.timing.trigger_poll_interval()).await;
            }
        }
        info!("orchestrator worker shutting down");
    }

    /// One full cycle. Normally driven by the spawned worker; callable
    /// directly for deterministic tests.
    pub async fn run_cycle(&mut self) {
        self.stats.cycles_started += 1;
        self.enter(CycleState::Triggered, "trigger accepted, starting cycle");
        match self.cycle_stages().await {
            Ok(CycleOutcome::Sorted(decision)) => {
                self.stats.successes += 1;
                self.enter(
                    CycleState::Idle,
                    &format!("'{}' sorted to {}", decision.label, decision.zone),
                );
            }
            Ok(CycleOutcome::NoMatch) => {
                self.stats.no_match += 1;
                self.enter(
                    CycleState::Idle,
                    "no actionable detection, skipping conveyance",
                );
            }
            Err(fault) => self.abort_cycle(fault).await,
        }
    }

    async fn cycle_stages(&mut self) -> Result<CycleOutcome, CycleFault> {
        self.transition(CycleState::Capturing)?;
        let frame = self.camera.capture().map_err(CycleFault::Hardware)?;

        self.transition(CycleState::Inferring)?;
        let detections = self.vision.infer(&frame).map_err(CycleFault::Inference)?;

        self.transition(CycleState::Deciding)?;
        let best = vision::best_detection(&detections);
        let decision = match zone::resolve(best, &self.zone_map, self.confidence_threshold) {
            Some(decision) => decision,
            None => return Ok(CycleOutcome::NoMatch),
        };
        self.log(&format!(
            "resolved '{}' -> {}",
            decision.label, decision.zone
        ));
        let place = match self.gestures.place_for(&decision.zone) {
            Some(gesture) => gesture.clone(),
            // Unreachable when construction validated the calibration, since
            // the library is built from the same zone map.
            None => {
                warn!("no place gesture for zone '{}'", decision.zone);
                return Ok(CycleOutcome::NoMatch);
            }
        };

        self.transition(CycleState::Conveying)?;
        self.convey_to_pickup().await?;

        self.transition(CycleState::Picking)?;
        let pickup = self.gestures.pickup.clone();
        self.run_gesture(&pickup).await?;

        self.transition(CycleState::Placing)?;
        self.run_gesture(&place).await?;

        self.transition(CycleState::Homing)?;
        let home = self.gestures.home.clone();
        self.run_gesture(&home).await?;

        Ok(CycleOutcome::Sorted(decision))
    }

    /// Starts the belt and polls the pickup sensor on a bounded interval. On
    /// timeout the belt is left running on purpose: `Aborting` owns the one
    /// unconditional stop.
    async fn convey_to_pickup(&mut self) -> Result<(), CycleFault> {
        self.conveyor.start().map_err(CycleFault::Hardware)?;
        let started = tokio::time::Instant::now();
        let max_wait = self.timing.conveyor_max_wait();
        loop {
            if self.conveyor.object_present().map_err(CycleFault::Hardware)? {
                self.conveyor.stop().map_err(CycleFault::Hardware)?;
                self.log("object at pickup point, belt stopped");
                return Ok(());
            }
            if started.elapsed() >= max_wait {
                return Err(CycleFault::ConveyorTimeout(ConveyorTimeout(max_wait)));
            }
            tokio::time::sleep(self.timing.conveyor_poll_interval()).await;
        }
    }

    async fn run_gesture(&mut self, gesture: &Gesture) -> Result<(), CycleFault> {
        let shared = self.shared.clone();
        match self
            .sequencer
            .execute_with_cancel(gesture, move || shared.abort_pending())
            .await
        {
            Ok(GestureRun::Completed) => Ok(()),
            Ok(GestureRun::Cancelled) => Err(CycleFault::AbortRequested),
            Err(e) => Err(CycleFault::Motion(e)),
        }
    }

    /// Best-effort recovery: stop the belt unconditionally, try to home the
    /// arm through the driver, and always return to `Idle`. A secondary fault
    /// while already failing is logged, never escalated.
    async fn abort_cycle(&mut self, fault: CycleFault) {
        let origin = self.state;
        self.shared.take_abort();
        self.stats.record_fault(fault.kind());
        self.enter(
            CycleState::Aborting,
            &format!("aborting from {origin:?}: {fault}"),
        );
        warn!("cycle aborted in {origin:?}: {fault}");
        if let Err(e) = self.conveyor.stop() {
            warn!("abort recovery: conveyor stop failed: {e}");
        }
        if let Err(e) = self.sequencer.hal_mut().home() {
            warn!("abort recovery: arm home failed: {e}");
        }
        self.enter(CycleState::Idle, "abort recovery complete");
    }

    /// Abort requests are honoured here, at state-transition boundaries, and
    /// between gesture steps; never mid motion step.
    fn transition(&mut self, state: CycleState) -> Result<(), CycleFault> {
        if self.shared.take_abort() {
            return Err(CycleFault::AbortRequested);
        }
        self.enter(state, &format!("entering {state:?}"));
        Ok(())
    }

    fn enter(&mut self, state: CycleState, message: &str) {
        self.state = state;
        info!("[{state:?}] {message}");
        self.snapshot.set(Snapshot {
            state,
            stats: self.stats.clone(),
            last_log: message.to_owned(),
        });
    }

    fn log(&self, message: &str) {
        info!("[{:?}] {message}", self.state);
        self.snapshot.set(Snapshot {
            state: self.state,
            stats: self.stats.clone(),
            last_log: message.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::arm_hal::{ArmHal, GripperAction, NUM_JOINTS};
    use crate::fault::{HardwareFault, InferenceFault, MotionError};
    use crate::surface::SurfaceTrigger;
    use crate::vision::{Detection, Detector, Frame, FrameSourceMock};

    #[derive(Debug, Clone, PartialEq)]
    enum ConveyorCall {
        Start,
        Poll,
        Stop,
    }

    struct RecordingConveyor {
        calls: Arc<Mutex<Vec<ConveyorCall>>>,
        present_after_polls: Option<usize>,
        polls: usize,
    }

    impl RecordingConveyor {
        fn new(calls: Arc<Mutex<Vec<ConveyorCall>>>, present_after_polls: Option<usize>) -> Self {
            Self {
                calls,
                present_after_polls,
                polls: 0,
            }
        }
    }

    impl ConveyorHal for RecordingConveyor {
        fn start(&mut self) -> Result<(), HardwareFault> {
            self.calls.lock().unwrap().push(ConveyorCall::Start);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), HardwareFault> {
            self.calls.lock().unwrap().push(ConveyorCall::Stop);
            Ok(())
        }

        fn object_present(&mut self) -> Result<bool, HardwareFault> {
            self.calls.lock().unwrap().push(ConveyorCall::Poll);
            self.polls += 1;
            Ok(match self.present_after_polls {
                Some(n) => self.polls >= n,
                None => false,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum ArmCall {
        Joint(usize, f64),
        Gripper(GripperAction),
        Home,
    }

    struct RecordingArm {
        calls: Arc<Mutex<Vec<ArmCall>>>,
        abort_on_first_command: Option<Arc<SurfaceShared>>,
    }

    impl RecordingArm {
        fn new(calls: Arc<Mutex<Vec<ArmCall>>>) -> Self {
            Self {
                calls,
                abort_on_first_command: None,
            }
        }
    }

    impl ArmHal for RecordingArm {
        fn set_joint_angle(&mut self, joint: usize, angle_deg: f64) -> Result<(), MotionError> {
            if let Some(shared) = self.abort_on_first_command.take() {
                shared.request_abort();
            }
            self.calls.lock().unwrap().push(ArmCall::Joint(joint, angle_deg));
            Ok(())
        }

        fn set_gripper(&mut self, action: GripperAction) -> Result<(), MotionError> {
            self.calls.lock().unwrap().push(ArmCall::Gripper(action));
            Ok(())
        }

        fn home(&mut self) -> Result<(), MotionError> {
            self.calls.lock().unwrap().push(ArmCall::Home);
            Ok(())
        }
    }

    struct StaticDetector(Result<Vec<Detection>, InferenceFault>);

    impl Detector for StaticDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, InferenceFault> {
            self.0.clone()
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        conveyor_calls: Arc<Mutex<Vec<ConveyorCall>>>,
        arm_calls: Arc<Mutex<Vec<ArmCall>>>,
    }

    fn harness(
        detections: Result<Vec<Detection>, InferenceFault>,
        present_after_polls: Option<usize>,
        abort_on_first_arm_command: bool,
    ) -> Harness {
        let mut config = SystemConfig::demo();
        config.timing.conveyor_max_wait_ms = 500;
        config.timing.conveyor_poll_interval_ms = 100;

        let conveyor_calls = Arc::new(Mutex::new(Vec::new()));
        let arm_calls = Arc::new(Mutex::new(Vec::new()));
        let conveyor = RecordingConveyor::new(conveyor_calls.clone(), present_after_polls);
        let mut arm = RecordingArm::new(arm_calls.clone());

        let orchestrator = Orchestrator::new(
            &config,
            Box::new(FrameSourceMock::new(640, 480)),
            VisionAdapter::new(Box::new(StaticDetector(detections))),
            Box::new(conveyor),
            MotionSequencer::new(Box::new(RecordingArm::new(arm_calls.clone()))),
        )
        .unwrap();
        if abort_on_first_arm_command {
            arm.abort_on_first_command = Some(orchestrator.shared());
        }
        // Swap in the arm wired to the orchestrator's shared flags.
        let orchestrator = Orchestrator {
            sequencer: MotionSequencer::new(Box::new(arm)),
            ..orchestrator
        };
        Harness {
            orchestrator,
            conveyor_calls,
            arm_calls,
        }
    }

    fn defect_a() -> Result<Vec<Detection>, InferenceFault> {
        Ok(vec![Detection::new("defect_A".to_owned(), 0.92, [0; 4])])
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_detection_reaches_idle_without_hardware_motion() {
        let mut h = harness(Ok(vec![]), Some(1), false);
        h.orchestrator.run_cycle().await;

        assert_eq!(h.orchestrator.state, CycleState::Idle);
        assert_eq!(h.orchestrator.stats.no_match, 1);
        assert_eq!(h.orchestrator.stats.successes, 0);
        assert!(h.conveyor_calls.lock().unwrap().is_empty());
        assert!(h.arm_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confidence_at_threshold_is_a_no_match() {
        let detections = Ok(vec![Detection::new("defect_A".to_owned(), 0.5, [0; 4])]);
        let mut h = harness(detections, Some(1), false);
        h.orchestrator.run_cycle().await;

        assert_eq!(h.orchestrator.stats.no_match, 1);
        assert!(h.conveyor_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_sequences_conveyor_then_arm() {
        let mut h = harness(defect_a(), Some(3), false);
        h.orchestrator.run_cycle().await;

        assert_eq!(h.orchestrator.state, CycleState::Idle);
        assert_eq!(h.orchestrator.stats.successes, 1);
        assert_eq!(h.orchestrator.stats.cycles_started, 1);

        let conveyor = h.conveyor_calls.lock().unwrap();
        assert_eq!(
            *conveyor,
            vec![
                ConveyorCall::Start,
                ConveyorCall::Poll,
                ConveyorCall::Poll,
                ConveyorCall::Poll,
                ConveyorCall::Stop,
            ]
        );

        let arm = h.arm_calls.lock().unwrap();
        let config = SystemConfig::demo();
        let approach = config.calibration.position("pickup_approach").unwrap();
        let zone1_drop = config.calibration.position("zone1_drop").unwrap();
        let home = config.calibration.position("home").unwrap();

        // pickup (3 steps) + place_in_zone1 (1 step) + home (1 step), each
        // step = 6 joints + 1 gripper command.
        assert_eq!(arm.len(), 5 * (NUM_JOINTS + 1));
        assert_eq!(arm[0], ArmCall::Joint(0, approach[0]));
        assert_eq!(arm[NUM_JOINTS], ArmCall::Gripper(GripperAction::Open));
        assert_eq!(
            arm[2 * NUM_JOINTS + 1],
            ArmCall::Gripper(GripperAction::Close)
        );
        // Fourth step is the zone1 drop, resolved from the detection label.
        assert_eq!(arm[3 * (NUM_JOINTS + 1)], ArmCall::Joint(0, zone1_drop[0]));
        // Last step parks at home via the homing gesture, not the driver.
        assert_eq!(arm[4 * (NUM_JOINTS + 1)], ArmCall::Joint(0, home[0]));
        assert!(!arm.contains(&ArmCall::Home));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conveyor_timeout_stops_belt_once_and_never_picks() {
        let mut h = harness(defect_a(), None, false);
        h.orchestrator.run_cycle().await;

        assert_eq!(h.orchestrator.state, CycleState::Idle);
        assert_eq!(h.orchestrator.stats.conveyor_timeouts, 1);
        assert_eq!(h.orchestrator.stats.successes, 0);

        let conveyor = h.conveyor_calls.lock().unwrap();
        assert_eq!(conveyor[0], ConveyorCall::Start);
        let stops = conveyor.iter().filter(|c| **c == ConveyorCall::Stop).count();
        assert_eq!(stops, 1);
        assert_eq!(*conveyor.last().unwrap(), ConveyorCall::Stop);

        // The sequencer never ran; recovery homed through the driver only.
        assert_eq!(*h.arm_calls.lock().unwrap(), vec![ArmCall::Home]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inference_fault_aborts_to_idle_without_conveyance() {
        let mut h = harness(
            Err(InferenceFault("weights went missing".to_owned())),
            Some(1),
            false,
        );
        h.orchestrator.run_cycle().await;

        assert_eq!(h.orchestrator.state, CycleState::Idle);
        assert_eq!(h.orchestrator.stats.inference_faults, 1);
        // Aborting still stops the belt unconditionally, but never started it.
        assert_eq!(*h.conveyor_calls.lock().unwrap(), vec![ConveyorCall::Stop]);
        assert_eq!(*h.arm_calls.lock().unwrap(), vec![ArmCall::Home]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_mid_picking_finishes_step_then_recovers() {
        let mut h = harness(defect_a(), Some(1), true);
        h.orchestrator.run_cycle().await;

        assert_eq!(h.orchestrator.state, CycleState::Idle);
        assert_eq!(h.orchestrator.stats.aborts_requested, 1);
        assert_eq!(h.orchestrator.stats.successes, 0);

        let arm = h.arm_calls.lock().unwrap();
        // The first pickup step (approach + open) completed despite the abort
        // arriving during its first joint command; the grab never happened.
        assert_eq!(arm.len(), NUM_JOINTS + 2);
        assert_eq!(arm[NUM_JOINTS], ArmCall::Gripper(GripperAction::Open));
        assert_eq!(*arm.last().unwrap(), ArmCall::Home);
        assert!(!arm.contains(&ArmCall::Gripper(GripperAction::Close)));

        // Belt stopped in Conveying and again, unconditionally, in Aborting.
        let conveyor = h.conveyor_calls.lock().unwrap();
        let stops = conveyor.iter().filter(|c| **c == ConveyorCall::Stop).count();
        assert_eq!(stops, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_inputs_drive_identical_cycles() {
        let mut first = harness(defect_a(), Some(2), false);
        first.orchestrator.run_cycle().await;
        let mut second = harness(defect_a(), Some(2), false);
        second.orchestrator.run_cycle().await;

        assert_eq!(first.orchestrator.stats, second.orchestrator.stats);
        assert_eq!(
            *first.arm_calls.lock().unwrap(),
            *second.arm_calls.lock().unwrap()
        );
        assert_eq!(
            *first.conveyor_calls.lock().unwrap(),
            *second.conveyor_calls.lock().unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_backend_matches_recorded_transitions_and_stats() {
        // Backends may only differ in where commands land, never in the state
        // machine they drive.
        let mut recorded = harness(defect_a(), Some(2), false);
        recorded.orchestrator.run_cycle().await;

        let mut config = SystemConfig::demo();
        config.timing.conveyor_max_wait_ms = 500;
        config.timing.conveyor_poll_interval_ms = 100;
        let calibration =
            crate::arm_hal::ArmCalibration::from_calibration(&config.calibration).unwrap();
        let mut simulated = Orchestrator::new(
            &config,
            Box::new(FrameSourceMock::new(640, 480)),
            VisionAdapter::new(Box::new(StaticDetector(defect_a()))),
            Box::new(crate::conveyor_hal_mock::ConveyorHalMock::new(2)),
            MotionSequencer::new(Box::new(crate::arm_hal_mock::ArmHalMock::new(calibration))),
        )
        .unwrap();
        simulated.run_cycle().await;

        assert_eq!(simulated.state, CycleState::Idle);
        assert_eq!(simulated.stats, recorded.orchestrator.stats);
        assert_eq!(
            simulated.snapshot.get_cloned().last_log,
            recorded.orchestrator.snapshot.get_cloned().last_log
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_publishes_state_and_stats() {
        let mut h = harness(defect_a(), Some(1), false);
        let snapshot = h.orchestrator.snapshot.clone();
        h.orchestrator.run_cycle().await;

        let published = snapshot.get_cloned();
        assert_eq!(published.state, CycleState::Idle);
        assert_eq!(published.stats.successes, 1);
        assert_eq!(published.last_log, "'defect_A' sorted to zone1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_honours_start_stop_and_drops_queued_triggers() {
        let h = harness(defect_a(), Some(1), false);
        let shared = h.orchestrator.shared();
        let handle = h
            .orchestrator
            .spawn(Box::new(SurfaceTrigger::new(shared)));

        // Triggering while stopped does nothing.
        handle.inject_trigger();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(handle.snapshot().stats.cycles_started, 0);

        handle.request_start();
        let mut completed = false;
        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if handle.snapshot().stats.successes == 1 {
                completed = true;
                break;
            }
        }
        assert!(completed, "cycle never completed: {:?}", handle.snapshot());

        // Stop disables triggering without touching the finished stats.
        handle.request_stop();
        handle.inject_trigger();
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.stats.cycles_started, 1);
        assert_eq!(snapshot.state, CycleState::Idle);

        handle.shutdown().await;
    }
}
