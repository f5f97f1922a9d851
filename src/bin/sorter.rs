//! Run the inspection/sort line end to end:
//!
//! 1. Home the arm
//! 2. Enable the orchestrator worker
//! 3. Inject one manual trigger per requested cycle
//! 4. Print the outcome counters
//!
//! With `--fake-hw` (or the built-in demo config) everything runs against the
//! simulated backends, which makes this a convenient dry run for a new
//! calibration file before the real servos get involved.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rand::prelude::*;

use pcba_sortbot::arm_hal_factory::ArmHalFactory;
use pcba_sortbot::config::SystemConfig;
use pcba_sortbot::conveyor_hal_factory::ConveyorHalFactory;
use pcba_sortbot::fault::InferenceFault;
use pcba_sortbot::motion::MotionSequencer;
use pcba_sortbot::orchestrator::{CycleStats, Orchestrator};
use pcba_sortbot::surface::SurfaceTrigger;
use pcba_sortbot::vision::{Detection, Detector, Frame, FrameSourceMock, VisionAdapter};

#[derive(Parser, Debug)]
#[clap(name = "sorter")]
struct Opts {
    /// Calibration/config JSON; the built-in demo config when omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(long)]
    fake_hw: bool,

    /// Home the arm, then exit without running any cycles.
    #[clap(long)]
    calibrate_only: bool,

    #[clap(short = 'n', long, default_value = "4")]
    cycles: usize,
}

const SNAPSHOT_POLL: Duration = Duration::from_millis(100);
const CYCLE_DEADLINE: Duration = Duration::from_secs(30);

/// Stand-in detector for dry runs: picks a random known label (or none) with
/// a random confidence, so every decision path gets exercised.
struct DemoDetector {
    labels: Vec<String>,
    rng: StdRng,
}

impl DemoDetector {
    fn new(config: &SystemConfig) -> Self {
        let mut labels: Vec<String> = config.calibration.zone_map.keys().cloned().collect();
        labels.sort();
        Self {
            labels,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Detector for DemoDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, InferenceFault> {
        if self.rng.gen_bool(0.2) {
            return Ok(vec![]);
        }
        let label = self.labels[self.rng.gen_range(0..self.labels.len())].clone();
        let confidence = self.rng.gen_range(0.3..1.0);
        Ok(vec![Detection::new(label, confidence, [120, 80, 220, 180])])
    }
}

fn total_outcomes(stats: &CycleStats) -> u64 {
    stats.successes
        + stats.no_match
        + stats.hardware_faults
        + stats.motion_faults
        + stats.inference_faults
        + stats.conveyor_timeouts
        + stats.aborts_requested
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts: Opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::demo(),
    };

    let mut arm = ArmHalFactory::new_maybe_mock(opts.fake_hw).create_hal(&config)?;
    arm.home()?;
    println!("Arm homed.");
    if opts.calibrate_only {
        return Ok(());
    }

    let conveyor = ConveyorHalFactory::new_maybe_mock(opts.fake_hw).create_hal(&config)?;
    let mut vision = VisionAdapter::new(Box::new(DemoDetector::new(&config)));
    if config.vision.preprocess {
        // Crude background suppression; the real transform belongs to the
        // external pipeline and is injected the same way.
        vision = vision.with_preprocess(Box::new(|frame| {
            let mut copy = frame.clone();
            for px in copy.data.iter_mut() {
                *px = px.saturating_sub(16);
            }
            copy
        }));
    }
    let orchestrator = Orchestrator::new(
        &config,
        Box::new(FrameSourceMock::new(640, 480)),
        vision,
        conveyor,
        MotionSequencer::new(arm),
    )?;
    let shared = orchestrator.shared();
    let handle = orchestrator.spawn(Box::new(SurfaceTrigger::new(shared)));
    handle.request_start();

    println!("Running {} cycle(s), let's do this...", opts.cycles);
    for cycle in 0..opts.cycles {
        handle.inject_trigger();
        let target = (cycle + 1) as u64;
        let mut waited = Duration::ZERO;
        while total_outcomes(&handle.snapshot().stats) < target {
            if waited >= CYCLE_DEADLINE {
                anyhow::bail!("cycle {} did not finish within {CYCLE_DEADLINE:?}", cycle + 1);
            }
            tokio::time::sleep(SNAPSHOT_POLL).await;
            waited += SNAPSHOT_POLL;
        }
        println!("[{}/{}] {}", cycle + 1, opts.cycles, handle.snapshot().last_log);
    }

    handle.request_stop();
    let stats = handle.snapshot().stats;
    handle.shutdown().await;

    println!();
    println!("Cycles started:    {}", stats.cycles_started);
    println!("Sorted:            {}", stats.successes);
    println!("No match:          {}", stats.no_match);
    println!("Hardware faults:   {}", stats.hardware_faults);
    println!("Motion faults:     {}", stats.motion_faults);
    println!("Inference faults:  {}", stats.inference_faults);
    println!("Conveyor timeouts: {}", stats.conveyor_timeouts);
    println!("Aborts:            {}", stats.aborts_requested);
    Ok(())
}
