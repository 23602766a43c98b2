use crate::annotator::Rgb;
use crate::labels::ClassLabel;
use crate::violation::ViolationKind;

/// What a single detection means for the overlay and the violation log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub color: Rgb,
    pub violation: Option<ViolationKind>,
}

impl Verdict {
    #[inline]
    fn clear() -> Self {
        Self {
            color: Rgb::GREEN,
            violation: None,
        }
    }

    #[inline]
    fn violation(kind: ViolationKind) -> Self {
        Self {
            color: Rgb::RED,
            violation: Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    pub overspeed_threshold_kmh: f32,
}

impl Classifier {
    #[inline]
    pub fn new(overspeed_threshold_kmh: f32) -> Self {
        Self {
            overspeed_threshold_kmh,
        }
    }

    /// `speed` is the freshly estimated km/h for vehicles and ignored for
    /// every other class. `None` means the detection is not drawn at all.
    pub fn classify(&self, label: ClassLabel, speed: f32) -> Option<Verdict> {
        match label {
            l if l.is_vehicle() => {
                if speed > self.overspeed_threshold_kmh {
                    Some(Verdict::violation(ViolationKind::Overspeeding))
                } else {
                    Some(Verdict::clear())
                }
            }
            ClassLabel::NoHelmet => Some(Verdict::violation(ViolationKind::NoHelmet)),
            ClassLabel::NoSeatbelt => Some(Verdict::violation(ViolationKind::NoSeatbelt)),
            _ => None,
        }
    }
}
