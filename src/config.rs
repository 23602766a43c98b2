use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::labels::{ClassEntry, ClassMap, COCO_CLASSES};

pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;
/// Meters per pixel: 100 pixels spanning 10 meters.
pub const DEFAULT_CALIBRATION_FACTOR: f32 = 0.1;
pub const DEFAULT_OVERSPEED_THRESHOLD_KMH: f32 = 50.0;
pub const DEFAULT_MAX_TRACKS: usize = 256;
pub const DEFAULT_MAX_AGE_SECS: f32 = 2.0;
pub const DEFAULT_MAX_DISTANCE_PX: f32 = 150.0;

/// Process-wide settings of one pipeline, fixed at startup.
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// calibration_factor = 0.05
/// overspeed_threshold_kmh = 60.0
///
/// [tracker]
/// max_tracks = 64
/// association = { kind = "greedy", max_distance = 40.0 }
///
/// [[classes]]
/// id = 2
/// label = "car"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Working resolution every frame is resized to.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Meters per pixel.
    pub calibration_factor: f32,
    /// Vehicles strictly faster than this are overspeeding.
    pub overspeed_threshold_kmh: f32,
    /// Overrides the frame rate reported by the source.
    pub fps: Option<f32>,
    pub classes: Vec<ClassEntry>,
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            calibration_factor: DEFAULT_CALIBRATION_FACTOR,
            overspeed_threshold_kmh: DEFAULT_OVERSPEED_THRESHOLD_KMH,
            fps: None,
            classes: COCO_CLASSES.to_vec(),
            tracker: TrackerConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, Error> {
        let config: PipelineConfig = toml::from_str(src)?;
        config.validate()?;

        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&src)?;
        log::info!("loaded pipeline config from {}", path.display());

        Ok(config)
    }

    #[inline]
    pub fn class_map(&self) -> ClassMap {
        ClassMap::new(&self.classes)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame resolution {}x{} must be non-zero",
                self.frame_width, self.frame_height
            )));
        }

        if !self.calibration_factor.is_finite() || self.calibration_factor <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "calibration_factor must be positive, got {}",
                self.calibration_factor
            )));
        }

        if !self.overspeed_threshold_kmh.is_finite() {
            return Err(Error::InvalidConfig(
                "overspeed_threshold_kmh must be finite".into(),
            ));
        }

        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "fps override must be positive, got {}",
                    fps
                )));
            }
        }

        self.tracker.validate()?;
        self.detector.validate()
    }
}

/// How detections of a new frame are matched against tracked vehicles.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Association {
    /// Identity is the pixel-exact `(class, x1, y1)` of the last detection.
    /// The default.
    Exact,
    /// Nearest centers first, within `max_distance` pixels.
    Greedy { max_distance: f32 },
    /// Minimum total distance assignment, within `max_distance` pixels.
    Optimal { max_distance: f32 },
}

impl Default for Association {
    fn default() -> Self {
        Association::Exact
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub association: Association,
    /// Upper bound on tracked vehicles; the least recently seen is evicted.
    pub max_tracks: usize,
    /// Seconds after which an unseen vehicle is forgotten.
    pub max_age: Option<f32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            association: Association::default(),
            max_tracks: DEFAULT_MAX_TRACKS,
            max_age: Some(DEFAULT_MAX_AGE_SECS),
        }
    }
}

impl TrackerConfig {
    /// Pixel-exact identity without eviction limits other than `max_tracks`.
    pub fn exact() -> Self {
        Self {
            max_age: None,
            ..Self::default()
        }
    }

    /// Minimum-cost matching of centers within `DEFAULT_MAX_DISTANCE_PX`.
    pub fn optimal() -> Self {
        Self {
            association: Association::Optimal {
                max_distance: DEFAULT_MAX_DISTANCE_PX,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_tracks == 0 {
            return Err(Error::InvalidConfig("tracker.max_tracks must be >= 1".into()));
        }

        if let Some(age) = self.max_age {
            if !age.is_finite() || age <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "tracker.max_age must be positive, got {}",
                    age
                )));
            }
        }

        match self.association {
            Association::Exact => Ok(()),
            Association::Greedy { max_distance } | Association::Optimal { max_distance } => {
                if max_distance.is_finite() && max_distance > 0.0 {
                    Ok(())
                } else {
                    Err(Error::InvalidConfig(format!(
                        "tracker.association.max_distance must be positive, got {}",
                        max_distance
                    )))
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX model consumed by the OpenCV detector.
    pub model: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: None,
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(Error::InvalidConfig(
                "detector input size must be non-zero".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold)
            || !(0.0..=1.0).contains(&self.iou_threshold)
        {
            return Err(Error::InvalidConfig(
                "detector thresholds must lie in [0, 1]".into(),
            ));
        }

        Ok(())
    }
}
