use derive_new::new;
use log::debug;

use crate::fault::{HardwareFault, InferenceFault};

/// Opaque pixel buffer plus dimensions. The core never interprets pixels; it
/// only hands frames across the camera and detector boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }
}

#[derive(Debug, Clone, PartialEq, new)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bbox: [i32; 4],
}

/// Camera boundary. Device open/read lives outside the core.
pub trait FrameSource {
    fn capture(&mut self) -> Result<Frame, HardwareFault>;
}

/// External detector boundary. The model and its weight loading live outside
/// the core; failures surface as [`InferenceFault`] and are never retried
/// here (the orchestrator's abort/idle path is the retry).
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceFault>;
}

pub type PreprocessFn = Box<dyn Fn(&Frame) -> Frame + Send>;

/// Wraps the detector and optionally applies an injected pre-processing
/// transform to a copy of the frame. The caller's frame is never mutated; it
/// may be reused (e.g. for display).
pub struct VisionAdapter {
    detector: Box<dyn Detector + Send>,
    preprocess: Option<PreprocessFn>,
}

impl VisionAdapter {
    pub fn new(detector: Box<dyn Detector + Send>) -> Self {
        Self {
            detector,
            preprocess: None,
        }
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessFn) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    pub fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceFault> {
        let detections = match &self.preprocess {
            Some(transform) => {
                let processed = transform(frame);
                self.detector.detect(&processed)?
            }
            None => self.detector.detect(frame)?,
        };
        debug!("detector returned {} detection(s)", detections.len());
        Ok(detections)
    }
}

/// Reduces raw detections to the single highest-confidence one, or `None`
/// when the detector returned an empty set.
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// A frame source that always yields a blank frame, for running the pipeline
/// with no attached camera.
#[derive(Debug, Default)]
pub struct FrameSourceMock {
    pub width: u32,
    pub height: u32,
}

impl FrameSourceMock {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FrameSource for FrameSourceMock {
    fn capture(&mut self) -> Result<Frame, HardwareFault> {
        debug!("sim camera: capture {}x{}", self.width, self.height);
        Ok(Frame::blank(self.width, self.height))
    }
}
