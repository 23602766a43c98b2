use std::collections::VecDeque;

use chrono::NaiveDate;
use speedtrap::clock::FixedClock;
use speedtrap::{
    Association, ClassLabel, Detection, Detector, Error, MemorySink, MemorySource, Pipeline,
    PipelineConfig, RasterFrame, Rgb, TrackerConfig, ViolationEvent, ViolationKind,
    ViolationSink,
};

const PERSON: i32 = 0;
const CAR: i32 = 2;
const TRUCK: i32 = 7;
const HELMET: i32 = 36;
const SEATBELT: i32 = 37;

/// Replays a fixed list of per-frame detector outputs.
struct Scripted {
    frames: VecDeque<Result<Vec<Detection>, Error>>,
}

impl Scripted {
    fn new(frames: Vec<Result<Vec<Detection>, Error>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    fn ok(frames: Vec<Vec<Detection>>) -> Self {
        Self::new(frames.into_iter().map(Ok).collect())
    }
}

impl Detector<RasterFrame> for Scripted {
    fn detect(&mut self, _: &RasterFrame) -> Result<Vec<Detection>, Error> {
        self.frames.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct FailingSink {
    attempts: usize,
}

impl ViolationSink for FailingSink {
    fn append(&mut self, _: &ViolationEvent) -> Result<(), Error> {
        self.attempts += 1;
        Err(Error::Sink("disk full".into()))
    }

    fn flush(&mut self) -> Result<usize, Error> {
        Err(Error::Sink("disk full".into()))
    }
}

fn clock() -> FixedClock {
    FixedClock(
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(10, 20, 30))
            .unwrap(),
    )
}

fn config(association: Association) -> PipelineConfig {
    PipelineConfig {
        calibration_factor: 0.1,
        tracker: TrackerConfig {
            association,
            max_tracks: 64,
            max_age: None,
        },
        ..PipelineConfig::default()
    }
}

fn frames(n: usize) -> Vec<RasterFrame> {
    (0..n).map(|_| RasterFrame::new(640, 480)).collect()
}

/// Car keeps its top-left corner while its box grows by 200 px, moving its
/// center 100 px to the right.
fn fast_car() -> Vec<Vec<Detection>> {
    vec![
        vec![Detection::ltrb(CAR, 0.9, 100.0, 100.0, 140.0, 140.0)],
        vec![Detection::ltrb(CAR, 0.9, 100.0, 100.0, 340.0, 140.0)],
    ]
}

#[test]
fn fast_car_is_overspeeding_and_red() {
    for association in [
        Association::Exact,
        Association::Greedy { max_distance: 150.0 },
        Association::Optimal { max_distance: 150.0 },
    ] {
        let mut pipeline = Pipeline::with_clock(
            &config(association),
            Scripted::ok(fast_car()),
            MemorySink::new(),
            clock(),
        );
        pipeline.set_source_fps(30.0);

        let mut images = frames(2);

        let first = pipeline.process_frame(&mut images[0]);
        assert_eq!(first.vehicles.len(), 1);
        assert_eq!(first.vehicles[0].prior, None);
        assert_eq!(first.vehicles[0].speed_kmh, 0.0);
        assert_eq!(first.vehicles[0].color, Rgb::GREEN);
        assert!(first.events.is_empty());
        assert_eq!(images[0].pixel(100, 100), Some(Rgb::GREEN));

        let second = pipeline.process_frame(&mut images[1]);
        let car = &second.vehicles[0];
        assert_eq!(car.key, first.vehicles[0].key);
        assert_eq!(car.prior, Some(first.vehicles[0].current));
        assert!((car.speed_kmh - 1080.0).abs() < 1e-2, "{}", car.speed_kmh);
        assert_eq!(car.color, Rgb::RED);
        assert_eq!(images[1].pixel(100, 100), Some(Rgb::RED));
        assert_eq!(images[1].pixel(340, 140), Some(Rgb::RED));

        assert_eq!(
            second.events,
            vec![ViolationEvent::new(ViolationKind::Overspeeding, "2024-05-01 10:20:30")]
        );
        assert!(images[1]
            .labels()
            .iter()
            .any(|l| l.text == "Speed: 1080.00 km/h"));
        assert_eq!(pipeline.sink().events.len(), 1);
    }
}

#[test]
fn default_config_tracks_a_growing_box_by_its_corner() {
    let mut pipeline = Pipeline::with_clock(
        &PipelineConfig::default(),
        Scripted::ok(vec![
            vec![Detection::ltrb(CAR, 0.9, 10.0, 20.0, 50.0, 60.0)],
            vec![Detection::ltrb(CAR, 0.9, 10.0, 20.0, 430.0, 60.0)],
        ]),
        MemorySink::new(),
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(2));
    let mut speeds = Vec::new();
    let summary = pipeline
        .run(&mut source, |frame| {
            speeds.push(
                frame
                    .image
                    .labels()
                    .iter()
                    .filter(|l| l.text.starts_with("Speed"))
                    .count(),
            );
            Ok(())
        })
        .unwrap();

    // center moves from x=30 to x=220: 190 px * 0.1 * 30 * 3.6
    assert_eq!(speeds, vec![0, 1]);
    assert_eq!(summary.violations, 1);
    assert_eq!(
        pipeline.violations().as_slice(),
        &[ViolationEvent::new(ViolationKind::Overspeeding, "2024-05-01 10:20:30")]
    );
    assert!(pipeline
        .tracker()
        .iter()
        .all(|(_, v)| v.last_center.x == 220));
}

#[test]
fn boxes_beyond_pixel_range_are_rejected_without_panicking() {
    let mut pipeline = Pipeline::with_clock(
        &PipelineConfig::default(),
        Scripted::ok(vec![
            vec![Detection::ltrb(CAR, 0.9, 2.0e9, 10.0, 2.1e9, 20.0)],
            vec![Detection::ltrb(CAR, 0.9, -3.0e9, -3.0e9, 10.0, 10.0)],
            vec![Detection::ltrb(HELMET, 0.9, 10.0, 10.0, 30.0, 30.0)],
        ]),
        MemorySink::new(),
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(3));
    let summary = pipeline.run(&mut source, |_| Ok(())).unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.skipped_frames, 2);
    assert_eq!(summary.violations, 1);
    assert!(pipeline.tracker().is_empty());
}

#[test]
fn empty_stream_flushes_zero_records() {
    let mut pipeline = Pipeline::with_clock(
        &PipelineConfig::default(),
        Scripted::ok(Vec::new()),
        MemorySink::new(),
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(0));
    let mut seen = 0;
    let summary = pipeline
        .run(&mut source, |_| {
            seen += 1;
            Ok(())
        })
        .unwrap();

    assert_eq!(seen, 0);
    assert_eq!(summary.frames, 0);
    assert_eq!(summary.violations, 0);
    assert_eq!(summary.persisted, 0);
    assert!(pipeline.violations().is_empty());
    assert_eq!(pipeline.sink().flushes, 1);
}

#[test]
fn persons_never_reach_the_classifier() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(vec![vec![
            Detection::ltrb(PERSON, 1.0, 0.0, 0.0, 639.0, 479.0),
            Detection::ltrb(PERSON, 0.01, 10.0, 10.0, 20.0, 20.0),
        ]]),
        MemorySink::new(),
        clock(),
    );
    pipeline.set_source_fps(30.0);

    let mut image = RasterFrame::new(640, 480);
    let report = pipeline.process_frame(&mut image);

    assert!(report.vehicles.is_empty());
    assert!(report.markers.is_empty());
    assert!(report.events.is_empty());
    assert!(pipeline.tracker().is_empty());
    assert!(image.as_bytes().iter().all(|&b| b == 0));
    // only the clock overlay
    assert_eq!(image.labels().len(), 2);
}

#[test]
fn safety_equipment_events_are_emitted_per_occurrence_in_detector_order() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(vec![
            vec![
                Detection::ltrb(HELMET, 0.4, 10.0, 10.0, 30.0, 30.0),
                Detection::ltrb(CAR, 0.9, 100.0, 100.0, 140.0, 140.0),
                Detection::ltrb(SEATBELT, 0.6, 200.0, 200.0, 230.0, 230.0),
            ],
            vec![
                Detection::ltrb(HELMET, 0.4, 10.0, 10.0, 30.0, 30.0),
                Detection::ltrb(HELMET, 0.9, 50.0, 10.0, 80.0, 30.0),
            ],
        ]),
        MemorySink::new(),
        clock(),
    );
    pipeline.set_source_fps(30.0);

    let mut images = frames(2);
    let first = pipeline.process_frame(&mut images[0]);
    let second = pipeline.process_frame(&mut images[1]);

    let kinds: Vec<_> = first.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ViolationKind::NoHelmet, ViolationKind::NoSeatbelt]);
    assert_eq!(first.markers.len(), 2);
    assert_eq!(first.markers[0].0, ClassLabel::NoHelmet);
    assert_eq!(first.markers[0].2, Rgb::RED);
    assert_eq!(images[0].pixel(10, 10), Some(Rgb::RED));

    assert_eq!(second.events.len(), 2);
    assert_eq!(pipeline.violations().count(ViolationKind::NoHelmet), 3);
    assert_eq!(pipeline.violations().count(ViolationKind::NoSeatbelt), 1);
    assert_eq!(pipeline.violations().count(ViolationKind::Overspeeding), 0);
}

#[test]
fn unmapped_classes_are_ignored() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(vec![vec![
            Detection::ltrb(1, 0.9, 10.0, 10.0, 30.0, 30.0),
            Detection::ltrb(55, 0.9, 40.0, 10.0, 60.0, 30.0),
        ]]),
        MemorySink::new(),
        clock(),
    );
    pipeline.set_source_fps(30.0);

    let mut image = RasterFrame::new(640, 480);
    let report = pipeline.process_frame(&mut image);
    assert!(report.markers.is_empty());
    assert!(report.events.is_empty());
    assert!(image.as_bytes().iter().all(|&b| b == 0));
}

#[test]
fn detector_failure_skips_only_that_frame() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::new(vec![
            Ok(vec![Detection::ltrb(TRUCK, 0.9, 100.0, 100.0, 140.0, 140.0)]),
            Err(Error::Detector("inference timed out".into())),
            Ok(vec![Detection::ltrb(CAR, 0.9, 0.0, 0.0, 10.0, 10.0)]),
            Ok(vec![Detection::ltrb(HELMET, 0.9, 0.0, 0.0, 10.0, 10.0)]),
        ]),
        MemorySink::new(),
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(4));
    let mut reports = Vec::new();
    let summary = pipeline
        .run(&mut source, |frame| {
            reports.push((frame.index, frame.image.labels().len()));
            Ok(())
        })
        .unwrap();

    assert_eq!(summary.frames, 4);
    assert_eq!(summary.skipped_frames, 1);
    assert_eq!(summary.violations, 1);
    assert_eq!(summary.persisted, 1);
    assert!(!summary.interrupted);
    // the failed frame still carries the clock overlay
    assert_eq!(reports[1], (1, 2));
}

#[test]
fn malformed_detection_skips_the_frame() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(vec![vec![
            Detection::ltrb(HELMET, 0.9, 10.0, 10.0, 30.0, 30.0),
            Detection::ltrb(CAR, 0.9, 50.0, 50.0, 50.0, 80.0),
        ]]),
        MemorySink::new(),
        clock(),
    );
    pipeline.set_source_fps(30.0);

    let mut image = RasterFrame::new(640, 480);
    let report = pipeline.process_frame(&mut image);

    assert!(report.skipped);
    assert!(report.events.is_empty());
    assert!(pipeline.violations().is_empty());
    assert!(pipeline.tracker().is_empty());
}

#[test]
fn sink_failure_keeps_events_in_memory() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(vec![
            vec![Detection::ltrb(HELMET, 0.9, 10.0, 10.0, 30.0, 30.0)],
            vec![Detection::ltrb(SEATBELT, 0.9, 10.0, 10.0, 30.0, 30.0)],
        ]),
        FailingSink { attempts: 0 },
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(2));
    let summary = pipeline.run(&mut source, |_| Ok(())).unwrap();

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.violations, 2);
    assert_eq!(summary.persisted, 0);
    // two appends and the final flush
    assert_eq!(summary.sink_failures, 3);
    assert_eq!(pipeline.sink().attempts, 2);
    assert_eq!(
        pipeline.violations().to_json().unwrap(),
        r#"[["No Helmet","2024-05-01 10:20:30"],["No Seatbelt","2024-05-01 10:20:30"]]"#
    );
}

#[test]
fn consumer_error_interrupts_and_still_flushes() {
    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(vec![
            vec![Detection::ltrb(HELMET, 0.9, 10.0, 10.0, 30.0, 30.0)],
            vec![Detection::ltrb(HELMET, 0.9, 10.0, 10.0, 30.0, 30.0)],
        ]),
        MemorySink::new(),
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(3));
    let summary = pipeline
        .run(&mut source, |_| Err(Error::Consumer("client went away".into())))
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.persisted, 1);
    assert_eq!(source.len(), 2);
    assert_eq!(pipeline.sink().flushes, 1);
}

#[test]
fn independent_pipelines_compute_identical_speeds() {
    let script: Vec<Vec<Detection>> = (0..12)
        .map(|i| {
            let dx = i as f32 * 6.0;
            vec![
                Detection::ltrb(CAR, 0.9, 100.0 + dx, 100.0, 140.0 + dx, 140.0),
                Detection::ltrb(TRUCK, 0.8, 400.0 - dx, 300.0, 460.0 - dx, 360.0),
            ]
        })
        .collect();

    let speeds = || {
        let mut pipeline = Pipeline::with_clock(
            &config(Association::Optimal { max_distance: 150.0 }),
            Scripted::ok(script.clone()),
            MemorySink::new(),
            clock(),
        );
        pipeline.set_source_fps(25.0);

        frames(script.len())
            .iter_mut()
            .flat_map(|image| {
                pipeline
                    .process_frame(image)
                    .vehicles
                    .into_iter()
                    .map(|v| (v.key, v.speed_kmh))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };

    let a = speeds();
    let b = speeds();
    assert_eq!(a, b);
    // 6 px per frame, 0.1 m/px, 25 fps
    assert!((a[2].1 - 6.0 * 0.1 * 25.0 * 3.6).abs() < 1e-3);
    assert!(a[2].1 > 50.0);
}

#[test]
fn csv_sink_receives_every_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("violations.csv");

    let mut pipeline = Pipeline::with_clock(
        &config(Association::Exact),
        Scripted::ok(fast_car()),
        speedtrap::CsvSink::create(&path).unwrap(),
        clock(),
    );

    let mut source = MemorySource::new(30.0, frames(2));
    let summary = pipeline.run(&mut source, |_| Ok(())).unwrap();
    assert_eq!(summary.persisted, 1);
    drop(pipeline);

    let out = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        out,
        "Violation Type,Timestamp\nOverspeeding,2024-05-01 10:20:30\n"
    );
}
