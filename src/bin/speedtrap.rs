//! speedtrap - run a traffic video through the violation pipeline.
//!
//! Writes the annotated frames to a video file and/or an MJPEG stream file
//! and appends every violation to a CSV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use opencv::{core, prelude::*, videoio};

use speedtrap::detector::OnnxDetector;
use speedtrap::frame::VideoSource;
use speedtrap::transport::{JpegEncoder, MjpegWriter};
use speedtrap::{CsvSink, Error, FrameSource, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect overspeeding and missing safety equipment in traffic video"
)]
struct Args {
    /// Video file or capture device URL.
    video: String,

    /// Pipeline configuration (TOML).
    #[arg(long, env = "SPEEDTRAP_CONFIG")]
    config: Option<PathBuf>,

    /// YOLO ONNX model; overrides `detector.model` from the configuration.
    #[arg(long, env = "SPEEDTRAP_MODEL")]
    model: Option<PathBuf>,

    /// Annotated video output (XVID).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Multipart MJPEG stream output.
    #[arg(long)]
    mjpeg: Option<PathBuf>,

    /// Violation CSV.
    #[arg(long, default_value = "violations.csv")]
    violations: PathBuf,

    /// Print the violation sequence as JSON when the stream ends.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let model = args
        .model
        .clone()
        .or_else(|| config.detector.model.clone())
        .ok_or_else(|| Error::InvalidConfig("no detector model given".into()))?;

    let detector = OnnxDetector::new(&model, &config.detector, config.class_map().ids())?;
    let sink = CsvSink::create(&args.violations)?;
    let mut source = VideoSource::open(&args.video, config.frame_width, config.frame_height)?;

    let mut video = match &args.output {
        Some(path) => {
            let fps = config.fps.unwrap_or_else(|| source.fps());
            let fps = if fps.is_finite() && fps > 0.0 { fps } else { 24.0 };

            let writer = videoio::VideoWriter::new(
                &path.to_string_lossy(),
                videoio::VideoWriter::fourcc(b'X' as _, b'V' as _, b'I' as _, b'D' as _)?,
                fps as f64,
                core::Size::new(config.frame_width as i32, config.frame_height as i32),
                true,
            )?;
            log::info!("writing annotated video to {}", path.display());
            Some(writer)
        }
        None => None,
    };

    let mut mjpeg = match &args.mjpeg {
        Some(path) => {
            log::info!("writing mjpeg stream to {}", path.display());
            Some(MjpegWriter::new(BufWriter::new(File::create(path)?), JpegEncoder))
        }
        None => None,
    };

    let mut pipeline = Pipeline::new(&config, detector, sink);
    let summary = pipeline.run(&mut source, |frame| {
        if let Some(video) = video.as_mut() {
            video.write(&frame.image)?;
        }

        if let Some(mjpeg) = mjpeg.as_mut() {
            mjpeg.write_frame(&frame.image)?;
        }

        Ok(())
    })?;

    if let Some(mut video) = video {
        video.release()?;
    }

    println!(
        "{} frames ({} skipped), {} violations",
        summary.frames, summary.skipped_frames, summary.violations
    );

    if summary.persisted > 0 {
        println!("{} written to {}", summary.persisted, args.violations.display());
    }

    if summary.sink_failures > 0 {
        log::warn!("{} violation writes failed", summary.sink_failures);
    }

    if args.json {
        println!("{}", pipeline.violations().to_json()?);
    }

    Ok(())
}
