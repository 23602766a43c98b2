use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Semantic meaning of a detector class id.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Person,
    Car,
    Motorcycle,
    Bus,
    Truck,
    TrafficLight,
    /// Detector class standing for a rider without a helmet.
    NoHelmet,
    /// Detector class standing for an occupant without a seatbelt.
    NoSeatbelt,
}

impl ClassLabel {
    #[inline]
    pub fn is_vehicle(self) -> bool {
        matches!(
            self,
            ClassLabel::Car | ClassLabel::Motorcycle | ClassLabel::Bus | ClassLabel::Truck
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::Person => "person",
            ClassLabel::Car => "car",
            ClassLabel::Motorcycle => "motorcycle",
            ClassLabel::Bus => "bus",
            ClassLabel::Truck => "truck",
            ClassLabel::TrafficLight => "traffic_light",
            ClassLabel::NoHelmet => "no_helmet",
            ClassLabel::NoSeatbelt => "no_seatbelt",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entry of the `[[classes]]` configuration table.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ClassEntry {
    pub id: i32,
    pub label: ClassLabel,
}

/// COCO ids used by the stock YOLOv8 weights; 36 and 37 are repurposed
/// as the helmet and seatbelt indicators.
pub const COCO_CLASSES: [ClassEntry; 8] = [
    ClassEntry { id: 0, label: ClassLabel::Person },
    ClassEntry { id: 2, label: ClassLabel::Car },
    ClassEntry { id: 3, label: ClassLabel::Motorcycle },
    ClassEntry { id: 5, label: ClassLabel::Bus },
    ClassEntry { id: 7, label: ClassLabel::Truck },
    ClassEntry { id: 9, label: ClassLabel::TrafficLight },
    ClassEntry { id: 36, label: ClassLabel::NoHelmet },
    ClassEntry { id: 37, label: ClassLabel::NoSeatbelt },
];

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    labels: HashMap<i32, ClassLabel>,
}

impl ClassMap {
    pub fn new(entries: &[ClassEntry]) -> Self {
        Self {
            labels: entries.iter().map(|e| (e.id, e.label)).collect(),
        }
    }

    #[inline]
    pub fn label(&self, class: i32) -> Option<ClassLabel> {
        self.labels.get(&class).copied()
    }

    /// Class ids mapped to `label`, in ascending order.
    pub fn ids_of(&self, label: ClassLabel) -> Vec<i32> {
        let mut ids: Vec<_> = self
            .labels
            .iter()
            .filter(|(_, l)| **l == label)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All mapped class ids, in ascending order.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<_> = self.labels.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self::new(&COCO_CLASSES)
    }
}
