use std::collections::VecDeque;

use crate::annotator::Canvas;
use crate::error::Error;

/// One raster image of a stream together with its position in the stream.
pub struct Frame<I> {
    pub index: u64,
    pub timestamp: f64, // in seconds, index / fps
    pub image: I,
}

impl<I: Canvas> Frame<I> {
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.image.dims()
    }
}

/// Lazy, non-restartable sequence of frames at a constant frame rate.
pub trait FrameSource {
    type Image;

    fn fps(&self) -> f32;

    /// `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Self::Image>, Error>;
}

/// Frames already held in memory.
pub struct MemorySource<I> {
    fps: f32,
    frames: VecDeque<I>,
}

impl<I> MemorySource<I> {
    pub fn new<T: IntoIterator<Item = I>>(fps: f32, frames: T) -> Self {
        Self {
            fps,
            frames: frames.into_iter().collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl<I> FrameSource for MemorySource<I> {
    type Image = I;

    #[inline]
    fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    fn next_frame(&mut self) -> Result<Option<I>, Error> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(feature = "opencv")]
pub use cv::VideoSource;

#[cfg(feature = "opencv")]
mod cv {
    use super::*;
    use opencv::{core, imgproc, prelude::*, videoio};

    /// Decodes a video file (or device) and resizes frames to the working
    /// resolution.
    pub struct VideoSource {
        cap: videoio::VideoCapture,
        fps: f32,
        size: core::Size,
    }

    impl VideoSource {
        pub fn open(src: &str, width: u32, height: u32) -> Result<Self, Error> {
            let cap = videoio::VideoCapture::from_file(src, videoio::CAP_ANY)?;
            if !videoio::VideoCapture::is_opened(&cap)? {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("unable to open video source {}", src),
                )));
            }

            let fps = cap.get(videoio::CAP_PROP_FPS)? as f32;
            let total = cap.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;
            log::info!("video {} opened: {} fps, {} frames", src, fps, total);

            Ok(Self {
                cap,
                fps,
                size: core::Size::new(width as i32, height as i32),
            })
        }
    }

    impl FrameSource for VideoSource {
        type Image = core::Mat;

        #[inline]
        fn fps(&self) -> f32 {
            self.fps
        }

        fn next_frame(&mut self) -> Result<Option<core::Mat>, Error> {
            let mut raw = core::Mat::default();
            if !self.cap.read(&mut raw)? || raw.cols() == 0 || raw.rows() == 0 {
                return Ok(None);
            }

            let mut frame = core::Mat::default();
            imgproc::resize(&raw, &mut frame, self.size, 0.0, 0.0, imgproc::INTER_LINEAR)?;

            Ok(Some(frame))
        }
    }

    impl Drop for VideoSource {
        fn drop(&mut self) {
            if let Err(err) = self.cap.release() {
                log::warn!("failed to release video source: {}", err);
            }
        }
    }
}
