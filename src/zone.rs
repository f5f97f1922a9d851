use std::collections::HashMap;

use derive_new::new;

use crate::vision::Detection;

/// Label string -> destination zone identifier.
pub type ZoneMap = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ZoneDecision {
    pub label: String,
    pub zone: String,
}

/// Pure mapping from the best detection to a destination zone. `None` when
/// there is no detection, the confidence does not strictly exceed the
/// threshold, or the label has no zone mapping. No side effects.
pub fn resolve(
    best: Option<&Detection>,
    zones: &ZoneMap,
    confidence_threshold: f64,
) -> Option<ZoneDecision> {
    let detection = best?;
    // Exclusive threshold: confidence exactly at the threshold does not count.
    if detection.confidence <= confidence_threshold {
        return None;
    }
    let zone = zones.get(&detection.label)?;
    Some(ZoneDecision::new(detection.label.clone(), zone.clone()))
}
