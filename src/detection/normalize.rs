use crate::error::{Error, Result};
use crate::models::{ClassVocabulary, Detection, NormalizedDetection};

/// Converts one detection into corner form, resolving its class ID.
pub fn normalize_detection(
    detection: &Detection,
    vocabulary: &ClassVocabulary,
) -> Result<NormalizedDetection> {
    let class_id = vocabulary
        .index_of(&detection.name)
        .ok_or_else(|| Error::UnknownLabel(detection.name.clone()))?;
    let b = &detection.bbox;
    Ok(NormalizedDetection {
        class_id,
        confidence: detection.confidence,
        x1: b.left,
        y1: b.top,
        x2: b.left + b.width,
        y2: b.top + b.height,
    })
}

/// Normalizes a service response, keeping its order.
///
/// No confidence filtering happens here. Fails on the first label missing
/// from the vocabulary.
pub fn normalize_detections(
    detections: &[Detection],
    vocabulary: &ClassVocabulary,
) -> Result<Vec<NormalizedDetection>> {
    detections
        .iter()
        .map(|d| normalize_detection(d, vocabulary))
        .collect()
}
