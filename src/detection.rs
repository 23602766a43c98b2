use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::error::Error;

/// One object located by the detector in one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    #[serde(rename = "c")]
    pub class: i32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "b")]
    pub bbox: BBox<Ltrb>,
}

impl Detection {
    #[inline]
    pub fn new(class: i32, confidence: f32, bbox: BBox<Ltrb>) -> Self {
        Self {
            class,
            confidence,
            bbox,
        }
    }

    #[inline]
    pub fn ltrb(class: i32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(class, confidence, BBox::ltrb(x1, y1, x2, y2))
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    /// Rejects detections the tracker cannot reason about: confidence outside
    /// `[0, 1]` or a box that is non-finite or has zero area.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::MalformedDetection(format!(
                "confidence {} out of range (class {})",
                self.confidence, self.class
            )));
        }

        if !self.bbox.is_valid() {
            return Err(Error::MalformedDetection(format!(
                "degenerate box {:?} (class {})",
                self.bbox.as_slice(),
                self.class
            )));
        }

        if !self.bbox.in_pixel_range() {
            return Err(Error::MalformedDetection(format!(
                "box {:?} out of pixel range (class {})",
                self.bbox.as_slice(),
                self.class
            )));
        }

        Ok(())
    }
}
