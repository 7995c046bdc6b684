//! Normalization of detector output into hazard records.

use crate::payload::HazardRecord;

/// One raw detection box as produced by the detector, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
    pub class_index: usize,
}

impl RawDetection {
    pub fn new(bbox: [f64; 4], confidence: f64, class_index: usize) -> Self {
        Self {
            x1: bbox[0],
            y1: bbox[1],
            x2: bbox[2],
            y2: bbox[3],
            confidence,
            class_index,
        }
    }
}

/// Output of an object detector for a single frame.
///
/// Implementations that carry no per-detection list return `None` from
/// [`DetectorOutput::detections`], which yields zero hazards.
pub trait DetectorOutput: Send + Sync {
    /// Per-detection boxes, in detector order.
    fn detections(&self) -> Option<&[RawDetection]>;

    /// Human-readable label for a class index.
    fn class_name(&self, class_index: usize) -> Option<&str>;
}

/// Owned detector result with its class-name table.
#[derive(Debug, Clone, Default)]
pub struct Detections {
    boxes: Vec<RawDetection>,
    class_names: Vec<String>,
}

impl Detections {
    pub fn new(boxes: Vec<RawDetection>, class_names: Vec<String>) -> Self {
        Self { boxes, class_names }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }
}

impl DetectorOutput for Detections {
    fn detections(&self) -> Option<&[RawDetection]> {
        Some(&self.boxes)
    }

    fn class_name(&self, class_index: usize) -> Option<&str> {
        self.class_names.get(class_index).map(String::as_str)
    }
}

/// Convert detector output into hazard records.
///
/// Coordinates are truncated toward zero. A class index without an entry in
/// the label table is reported as `class_<index>`.
pub fn to_hazards(output: Option<&dyn DetectorOutput>) -> Vec<HazardRecord> {
    let Some(output) = output else {
        return Vec::new();
    };
    let Some(boxes) = output.detections() else {
        return Vec::new();
    };

    boxes
        .iter()
        .map(|det| {
            let label = output
                .class_name(det.class_index)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{}", det.class_index));

            HazardRecord {
                class_id: det.class_index as i64,
                label,
                confidence: det.confidence,
                xmin: det.x1 as i64,
                ymin: det.y1 as i64,
                xmax: det.x2 as i64,
                ymax: det.y2 as i64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoBoxes;

    impl DetectorOutput for NoBoxes {
        fn detections(&self) -> Option<&[RawDetection]> {
            None
        }

        fn class_name(&self, _class_index: usize) -> Option<&str> {
            Some("Pothole")
        }
    }

    fn names() -> Vec<String> {
        vec!["Pothole".to_string(), "Crack".to_string()]
    }

    #[test]
    fn test_absent_result_yields_no_hazards() {
        assert!(to_hazards(None).is_empty());
    }

    #[test]
    fn test_output_without_boxes_yields_no_hazards() {
        assert!(to_hazards(Some(&NoBoxes)).is_empty());
    }

    #[test]
    fn test_empty_detections_yield_no_hazards() {
        let detections = Detections::new(vec![], names());
        assert!(to_hazards(Some(&detections)).is_empty());
    }

    #[test]
    fn test_coordinates_truncate_and_confidence_is_kept() {
        let detections = Detections::new(
            vec![RawDetection::new([100.9, 60.2, 300.7, 180.99], 0.9137, 1)],
            names(),
        );

        let hazards = to_hazards(Some(&detections));
        assert_eq!(hazards.len(), 1);

        let hazard = &hazards[0];
        assert_eq!(hazard.class_id, 1);
        assert_eq!(hazard.label, "Crack");
        assert_eq!(hazard.confidence, 0.9137);
        assert_eq!(
            (hazard.xmin, hazard.ymin, hazard.xmax, hazard.ymax),
            (100, 60, 300, 180)
        );
    }

    #[test]
    fn test_order_is_preserved() {
        let detections = Detections::new(
            vec![
                RawDetection::new([0.0, 0.0, 10.0, 10.0], 0.5, 1),
                RawDetection::new([5.0, 5.0, 20.0, 20.0], 0.8, 0),
            ],
            names(),
        );

        let labels: Vec<_> = to_hazards(Some(&detections))
            .into_iter()
            .map(|h| h.label)
            .collect();
        assert_eq!(labels, vec!["Crack", "Pothole"]);
    }

    #[test]
    fn test_unknown_class_index_label() {
        let detections = Detections::new(
            vec![RawDetection::new([0.0, 0.0, 1.0, 1.0], 0.7, 7)],
            names(),
        );
        assert_eq!(to_hazards(Some(&detections))[0].label, "class_7");
    }
}
