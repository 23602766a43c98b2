//! Framing of annotated frames for a `multipart/x-mixed-replace` feed.
//!
//! Serving the feed over HTTP is left to the embedding application; this
//! module only turns frames into the byte chunks such a server writes.

use std::io::Write;

use crate::annotator::RasterFrame;
use crate::error::Error;

pub const BOUNDARY: &str = "frame";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const PPM_CONTENT_TYPE: &str = "image/x-portable-pixmap";

/// Turns an annotated frame into an encoded image.
pub trait FrameEncoder<I: ?Sized> {
    fn content_type(&self) -> &'static str;

    fn encode(&mut self, image: &I) -> Result<Vec<u8>, Error>;
}

/// One part of the multipart stream:
/// `--frame\r\nContent-Type: <type>\r\n\r\n<bytes>\r\n`.
pub fn multipart_chunk(content_type: &str, payload: &[u8]) -> Vec<u8> {
    let head = format!("--{}\r\nContent-Type: {}\r\n\r\n", BOUNDARY, content_type);
    let mut chunk = Vec::with_capacity(head.len() + payload.len() + 2);
    chunk.extend_from_slice(head.as_bytes());
    chunk.extend_from_slice(payload);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

/// Binary PPM (`P6`), lossless and dependency free.
#[derive(Debug, Default, Clone, Copy)]
pub struct PpmEncoder;

impl FrameEncoder<RasterFrame> for PpmEncoder {
    #[inline]
    fn content_type(&self) -> &'static str {
        PPM_CONTENT_TYPE
    }

    fn encode(&mut self, image: &RasterFrame) -> Result<Vec<u8>, Error> {
        use crate::annotator::Canvas;

        let (w, h) = image.dims();
        let mut out = format!("P6\n{} {}\n255\n", w, h).into_bytes();
        out.extend_from_slice(image.as_bytes());
        Ok(out)
    }
}

/// Writes every frame it is given as a multipart chunk.
///
/// Writes are synchronous: a slow reader blocks the producer instead of
/// frames being dropped.
pub struct MjpegWriter<W: Write, E> {
    writer: W,
    encoder: E,
    frames: u64,
}

impl<W: Write, E> MjpegWriter<W, E> {
    pub fn new(writer: W, encoder: E) -> Self {
        Self {
            writer,
            encoder,
            frames: 0,
        }
    }

    pub fn write_frame<I: ?Sized>(&mut self, image: &I) -> Result<(), Error>
    where
        E: FrameEncoder<I>,
    {
        let payload = self.encoder.encode(image)?;
        let chunk = multipart_chunk(self.encoder.content_type(), &payload);
        self.writer.write_all(&chunk)?;
        self.writer.flush()?;
        self.frames += 1;

        Ok(())
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(feature = "opencv")]
pub use cv::JpegEncoder;

#[cfg(feature = "opencv")]
mod cv {
    use super::*;
    use opencv::{core, imgcodecs};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct JpegEncoder;

    impl FrameEncoder<core::Mat> for JpegEncoder {
        #[inline]
        fn content_type(&self) -> &'static str {
            JPEG_CONTENT_TYPE
        }

        fn encode(&mut self, image: &core::Mat) -> Result<Vec<u8>, Error> {
            let mut buf = core::Vector::<u8>::new();
            if !imgcodecs::imencode(".jpg", image, &mut buf, &core::Vector::new())? {
                return Err(Error::InvalidFrame("jpeg encoding failed".into()));
            }

            Ok(buf.to_vec())
        }
    }
}
