use nalgebra as na;

use crate::annotator::{Annotator, Canvas, Rgb};
use crate::bbox::{BBox, Ltrb};
use crate::classifier::Classifier;
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::detector::Detector;
use crate::error::Error;
use crate::frame::{Frame, FrameSource};
use crate::labels::{ClassLabel, ClassMap};
use crate::sink::ViolationSink;
use crate::speed::SpeedEstimator;
use crate::tracker::{TrackKey, VehicleTracker};
use crate::violation::{ViolationEvent, ViolationKind, ViolationLog};
use crate::Detection;

/// A vehicle as seen on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleReading {
    pub key: TrackKey,
    pub class: i32,
    pub bbox: BBox<Ltrb>,
    pub prior: Option<na::Point2<i32>>,
    pub current: na::Point2<i32>,
    pub speed_kmh: f32,
    pub color: Rgb,
}

/// Outcome of one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub index: u64,
    pub timestamp: f64,
    pub vehicles: Vec<VehicleReading>,
    /// Boxes drawn for non-vehicle detections, with their color.
    pub markers: Vec<(ClassLabel, BBox<Ltrb>, Rgb)>,
    pub events: Vec<ViolationEvent>,
    /// Set when the detector failed and the frame only carries the clock.
    pub skipped: bool,
}

impl FrameReport {
    fn new(index: u64, timestamp: f64) -> Self {
        Self {
            index,
            timestamp,
            vehicles: Vec::new(),
            markers: Vec::new(),
            events: Vec::new(),
            skipped: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub frames: u64,
    pub skipped_frames: usize,
    pub violations: usize,
    /// Records the sink reported as persisted on flush.
    pub persisted: usize,
    pub sink_failures: usize,
    /// The consumer gave up before the source was exhausted.
    pub interrupted: bool,
}

/// Detect, track, classify and annotate one stream.
///
/// All mutable state (tracker table, violation log) belongs to the instance,
/// so independent streams simply use independent pipelines.
pub struct Pipeline<D, S, C = SystemClock> {
    classes: ClassMap,
    tracker: VehicleTracker,
    speed: SpeedEstimator,
    classifier: Classifier,
    annotator: Annotator,
    detector: D,
    sink: S,
    clock: C,
    fps: f32,
    fps_override: Option<f32>,
    fps_warned: bool,
    next_index: u64,
    violations: ViolationLog,
    skipped_frames: usize,
    sink_failures: usize,
}

impl<D, S: ViolationSink> Pipeline<D, S, SystemClock> {
    pub fn new(config: &PipelineConfig, detector: D, sink: S) -> Self {
        Self::with_clock(config, detector, sink, SystemClock)
    }
}

impl<D, S: ViolationSink, C: Clock> Pipeline<D, S, C> {
    pub fn with_clock(config: &PipelineConfig, detector: D, sink: S, clock: C) -> Self {
        Self {
            classes: config.class_map(),
            tracker: VehicleTracker::new(config.tracker.clone()),
            speed: SpeedEstimator::new(config.calibration_factor),
            classifier: Classifier::new(config.overspeed_threshold_kmh),
            annotator: Annotator,
            detector,
            sink,
            clock,
            fps: config.fps.unwrap_or(0.0),
            fps_override: config.fps,
            fps_warned: false,
            next_index: 0,
            violations: ViolationLog::new(),
            skipped_frames: 0,
            sink_failures: 0,
        }
    }

    /// Frame rate reported by the source; ignored when the configuration
    /// overrides it.
    pub fn set_source_fps(&mut self, fps: f32) {
        if let Some(fps) = self.fps_override {
            self.fps = fps;
            return;
        }

        self.fps = fps;
        self.fps_warned = false;

        if !self.has_usable_fps() {
            log::warn!("source reports fps {}, speeds will read 0", fps);
            self.fps_warned = true;
        }
    }

    /// `true` once a positive frame rate is known, from the configuration or
    /// from the source.
    #[inline]
    pub fn has_usable_fps(&self) -> bool {
        self.fps.is_finite() && self.fps > 0.0
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn violations(&self) -> &ViolationLog {
        &self.violations
    }

    #[inline]
    pub fn tracker(&self) -> &VehicleTracker {
        &self.tracker
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn into_parts(self) -> (ViolationLog, S) {
        (self.violations, self.sink)
    }

    /// Stream time of frame `index` in seconds; the index itself when the
    /// frame rate is unknown.
    fn timestamp(&self, index: u64) -> f64 {
        if self.has_usable_fps() {
            index as f64 / self.fps as f64
        } else {
            index as f64
        }
    }

    /// Runs one frame through every stage, drawing overlays onto `image`.
    pub fn process_frame<I>(&mut self, image: &mut I) -> FrameReport
    where
        I: Canvas,
        D: Detector<I>,
    {
        if !self.has_usable_fps() && !self.fps_warned {
            log::warn!("no frame rate known, speeds will read 0 until one is set");
            self.fps_warned = true;
        }

        let index = self.next_index;
        self.next_index += 1;
        let mut report = FrameReport::new(index, self.timestamp(index));

        let label = self.clock.label();
        overlay(index, self.annotator.draw_clock(image, &label));

        let detections = match self.detect(index, image) {
            Some(detections) => detections,
            None => {
                self.skipped_frames += 1;
                report.skipped = true;
                return report;
            }
        };

        let labeled: Vec<(Detection, ClassLabel)> = detections
            .into_iter()
            .filter_map(|det| match self.classes.label(det.class) {
                Some(ClassLabel::Person) | None => None,
                Some(label) => Some((det, label)),
            })
            .collect();

        let vehicles: Vec<Detection> = labeled
            .iter()
            .filter(|(_, label)| label.is_vehicle())
            .map(|(det, _)| *det)
            .collect();

        let mut observations = self
            .tracker
            .update_frame(&vehicles, report.timestamp)
            .into_iter();

        for (det, label) in labeled {
            if label.is_vehicle() {
                let obs = match observations.next() {
                    Some(obs) => obs,
                    None => break,
                };

                let speed_kmh = self.speed.speed(obs.prior, Some(obs.current), self.fps);
                let verdict = match self.classifier.classify(label, speed_kmh) {
                    Some(verdict) => verdict,
                    None => continue,
                };

                overlay(index, self.annotator.draw_box(image, &det.bbox, verdict.color));
                if obs.prior.is_some() {
                    overlay(index, self.annotator.draw_speed(image, &det.bbox, speed_kmh));
                }

                if let Some(kind) = verdict.violation {
                    log::debug!(
                        "frame {}: vehicle {} at {:.2} km/h",
                        index,
                        obs.key,
                        speed_kmh
                    );
                    self.record(kind, &mut report);
                }

                report.vehicles.push(VehicleReading {
                    key: obs.key,
                    class: det.class,
                    bbox: det.bbox,
                    prior: obs.prior,
                    current: obs.current,
                    speed_kmh,
                    color: verdict.color,
                });
            } else if let Some(verdict) = self.classifier.classify(label, 0.0) {
                overlay(index, self.annotator.draw_box(image, &det.bbox, verdict.color));
                report.markers.push((label, det.bbox, verdict.color));

                if let Some(kind) = verdict.violation {
                    self.record(kind, &mut report);
                }
            }
        }

        report
    }

    /// Runs the detector, rejecting the whole frame on failure or on any
    /// malformed detection.
    fn detect<I>(&mut self, index: u64, image: &I) -> Option<Vec<Detection>>
    where
        D: Detector<I>,
    {
        let detections = match self.detector.detect(image) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("frame {}: detector failed, skipping: {}", index, err);
                return None;
            }
        };

        if let Some(err) = detections.iter().find_map(|det| det.validate().err()) {
            log::warn!("frame {}: {}, skipping", index, err);
            return None;
        }

        Some(detections)
    }

    fn record(&mut self, kind: ViolationKind, report: &mut FrameReport) {
        let event = ViolationEvent::new(kind, self.clock.event_timestamp());

        if let Err(err) = self.sink.append(&event) {
            self.sink_failures += 1;
            log::error!("failed to persist {} violation: {}", kind, err);
        }

        self.violations.push(event.clone());
        report.events.push(event);
    }

    /// Flushes the sink; returns the number of persisted records.
    pub fn finish(&mut self) -> Result<usize, Error> {
        let persisted = self.sink.flush()?;
        log::info!(
            "stream finished: {} violations, {} persisted",
            self.violations.len(),
            persisted
        );

        Ok(persisted)
    }

    /// Pulls frames until the source is exhausted, handing each annotated
    /// frame to `consumer` before pulling the next one.
    ///
    /// A consumer error ends the stream early; the sink is flushed either
    /// way. Source errors are returned after the flush.
    pub fn run<Src, F>(&mut self, source: &mut Src, mut consumer: F) -> Result<StreamSummary, Error>
    where
        Src: FrameSource,
        Src::Image: Canvas,
        D: Detector<Src::Image>,
        F: FnMut(&Frame<Src::Image>) -> Result<(), Error>,
    {
        self.set_source_fps(source.fps());

        let mut summary = StreamSummary::default();
        let outcome = loop {
            let mut image = match source.next_frame() {
                Ok(Some(image)) => image,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };

            let report = self.process_frame(&mut image);
            summary.frames += 1;

            let frame = Frame {
                index: report.index,
                timestamp: report.timestamp,
                image,
            };

            if let Err(err) = consumer(&frame) {
                log::warn!("consumer stopped the stream at frame {}: {}", frame.index, err);
                summary.interrupted = true;
                break Ok(());
            }
        };

        summary.persisted = match self.finish() {
            Ok(persisted) => persisted,
            Err(err) => {
                log::error!("failed to flush violations: {}", err);
                self.sink_failures += 1;
                0
            }
        };
        summary.skipped_frames = self.skipped_frames;
        summary.violations = self.violations.len();
        summary.sink_failures = self.sink_failures;

        outcome.map(|_| summary)
    }
}

#[inline]
fn overlay(index: u64, res: Result<(), Error>) {
    if let Err(err) = res {
        log::warn!("frame {}: failed to draw overlay: {}", index, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::RasterFrame;
    use crate::sink::MemorySink;

    fn no_detections(_: &RasterFrame) -> Result<Vec<Detection>, Error> {
        Ok(Vec::new())
    }

    #[test]
    fn timestamps_follow_frame_rate() {
        let mut pipeline = Pipeline::new(
            &PipelineConfig::default(),
            no_detections,
            MemorySink::new(),
        );
        pipeline.set_source_fps(25.0);

        let mut image = RasterFrame::new(32, 32);
        assert_eq!(pipeline.process_frame(&mut image).timestamp, 0.0);
        assert_eq!(pipeline.process_frame(&mut image).timestamp, 0.04);
        assert_eq!(pipeline.process_frame(&mut image).index, 2);
    }

    #[test]
    fn configured_fps_wins_over_source() {
        let config = PipelineConfig {
            fps: Some(10.0),
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(&config, no_detections, MemorySink::new());
        pipeline.set_source_fps(30.0);
        assert_eq!(pipeline.fps(), 10.0);
    }

    #[test]
    fn fps_is_unknown_until_configured_or_reported() {
        let mut pipeline = Pipeline::new(
            &PipelineConfig::default(),
            no_detections,
            MemorySink::new(),
        );
        assert!(!pipeline.has_usable_fps());

        let mut image = RasterFrame::new(32, 32);
        pipeline.process_frame(&mut image);
        assert!(pipeline.fps_warned);

        pipeline.set_source_fps(30.0);
        assert!(pipeline.has_usable_fps());
        assert!(!pipeline.fps_warned);

        let config = PipelineConfig {
            fps: Some(12.5),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(&config, no_detections, MemorySink::new());
        assert!(pipeline.has_usable_fps());
    }

    #[test]
    fn stream_time_keeps_single_frame_resolution_on_long_streams() {
        let mut pipeline = Pipeline::new(
            &PipelineConfig::default(),
            no_detections,
            MemorySink::new(),
        );
        pipeline.set_source_fps(1.0);

        let late = 1u64 << 25;
        assert_eq!(pipeline.timestamp(late), 33_554_432.0);
        assert_eq!(pipeline.timestamp(late + 1) - pipeline.timestamp(late), 1.0);
    }

    #[test]
    fn degenerate_source_fps_still_numbers_frames() {
        let mut pipeline = Pipeline::new(
            &PipelineConfig::default(),
            no_detections,
            MemorySink::new(),
        );
        pipeline.set_source_fps(0.0);

        let mut image = RasterFrame::new(32, 32);
        pipeline.process_frame(&mut image);
        assert_eq!(pipeline.process_frame(&mut image).timestamp, 1.0);
    }
}
