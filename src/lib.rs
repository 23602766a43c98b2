pub mod annotator;
pub mod bbox;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod labels;
pub mod pipeline;
pub mod sink;
pub mod speed;
pub mod tracker;
pub mod transport;
pub mod violation;

pub use annotator::{Annotator, Canvas, RasterFrame, Rgb};
pub use classifier::{Classifier, Verdict};
pub use config::{Association, PipelineConfig, TrackerConfig};
pub use detection::Detection;
pub use detector::Detector;
pub use error::Error;
pub use frame::{Frame, FrameSource, MemorySource};
pub use labels::{ClassLabel, ClassMap};
pub use pipeline::{FrameReport, Pipeline, StreamSummary, VehicleReading};
pub use sink::{CsvSink, LazyFile, MemorySink, ViolationSink};
pub use speed::SpeedEstimator;
pub use tracker::{Observation, TrackKey, VehicleTracker};
pub use violation::{ViolationEvent, ViolationKind, ViolationLog};
