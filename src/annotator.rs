use nalgebra as na;

use crate::bbox::{BBox, Ltrb};
use crate::error::Error;

pub const CLOCK_ORIGIN: (i32, i32) = (10, 30);
pub const CLOCK_SCALE: f32 = 1.0;
pub const CLOCK_THICKNESS: i32 = 2;
/// Extra stroke of the dark outline behind the clock text.
pub const CLOCK_OUTLINE: i32 = 3;
pub const SPEED_SCALE: f32 = 0.4;
pub const SPEED_THICKNESS: i32 = 2;
pub const SPEED_OFFSET: i32 = 10;
pub const BOX_THICKNESS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Drawing surface of one frame.
pub trait Canvas {
    fn dims(&self) -> (u32, u32);

    fn draw_rect(&mut self, bbox: &BBox<Ltrb>, color: Rgb, thickness: i32) -> Result<(), Error>;

    /// `origin` is the bottom-left corner of the text.
    fn put_text(
        &mut self,
        text: &str,
        origin: na::Point2<i32>,
        scale: f32,
        color: Rgb,
        thickness: i32,
    ) -> Result<(), Error>;
}

/// Text overlay recorded by [`RasterFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub origin: na::Point2<i32>,
    pub scale: f32,
    pub color: Rgb,
    pub thickness: i32,
}

/// Packed RGB8 image. Rectangles are rasterized into the buffer; text has no
/// font to render with, so it is kept as a list of overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    labels: Vec<TextLabel>,
}

impl RasterFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
            labels: Vec::new(),
        }
    }

    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, Error> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "rgb buffer of {} bytes does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            data,
            labels: Vec::new(),
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn labels(&self) -> &[TextLabel] {
        &self.labels
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb> {
        let idx = self.offset(x, y)?;
        Some(Rgb::new(self.data[idx], self.data[idx + 1], self.data[idx + 2]))
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }

        Some((y as usize * self.width as usize + x as usize) * 3)
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Rgb) {
        if let Some(idx) = self.offset(x, y) {
            self.data[idx] = color.r;
            self.data[idx + 1] = color.g;
            self.data[idx + 2] = color.b;
        }
    }

    fn hline(&mut self, y: i32, x1: i32, x2: i32, color: Rgb) {
        let (lo, hi) = (x1.max(0), x2.min(self.width as i32 - 1));
        for x in lo..=hi {
            self.set_pixel(x, y, color);
        }
    }

    fn vline(&mut self, x: i32, y1: i32, y2: i32, color: Rgb) {
        let (lo, hi) = (y1.max(0), y2.min(self.height as i32 - 1));
        for y in lo..=hi {
            self.set_pixel(x, y, color);
        }
    }
}

impl Canvas for RasterFrame {
    #[inline]
    fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw_rect(&mut self, bbox: &BBox<Ltrb>, color: Rgb, thickness: i32) -> Result<(), Error> {
        let [x1, y1, x2, y2] = bbox.pixels();
        let thickness = thickness.max(1);
        let half = thickness / 2;

        // strokes are centered on the box edges
        let (left, right) = (x1.saturating_sub(half), x2.saturating_add(half));
        let (top, bottom) = (y1.saturating_sub(half), y2.saturating_add(half));

        for o in -half..thickness - half {
            self.hline(y1.saturating_add(o), left, right, color);
            self.hline(y2.saturating_add(o), left, right, color);
            self.vline(x1.saturating_add(o), top, bottom, color);
            self.vline(x2.saturating_add(o), top, bottom, color);
        }

        Ok(())
    }

    fn put_text(
        &mut self,
        text: &str,
        origin: na::Point2<i32>,
        scale: f32,
        color: Rgb,
        thickness: i32,
    ) -> Result<(), Error> {
        self.labels.push(TextLabel {
            text: text.to_string(),
            origin,
            scale,
            color,
            thickness,
        });

        Ok(())
    }
}

/// Overlay drawing for the live feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Annotator;

impl Annotator {
    /// `Time: HH:MM:SS`, dark outline under a light fill so it stays legible
    /// on any background.
    pub fn draw_clock<C: Canvas + ?Sized>(&self, canvas: &mut C, label: &str) -> Result<(), Error> {
        let text = format!("Time: {}", label);
        let origin = na::Point2::new(CLOCK_ORIGIN.0, CLOCK_ORIGIN.1);

        canvas.put_text(
            &text,
            origin,
            CLOCK_SCALE,
            Rgb::BLACK,
            CLOCK_THICKNESS + CLOCK_OUTLINE,
        )?;
        canvas.put_text(&text, origin, CLOCK_SCALE, Rgb::WHITE, CLOCK_THICKNESS)
    }

    #[inline]
    pub fn draw_box<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        bbox: &BBox<Ltrb>,
        color: Rgb,
    ) -> Result<(), Error> {
        canvas.draw_rect(bbox, color, BOX_THICKNESS)
    }

    /// Speed label just above the box. Non-finite speeds are not drawn.
    pub fn draw_speed<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        bbox: &BBox<Ltrb>,
        kmh: f32,
    ) -> Result<(), Error> {
        if !kmh.is_finite() {
            log::warn!("refusing to draw non-finite speed {}", kmh);
            return Ok(());
        }

        let corner = bbox.corner();
        canvas.put_text(
            &format!("Speed: {:.2} km/h", kmh),
            na::Point2::new(corner.x, corner.y.saturating_sub(SPEED_OFFSET)),
            SPEED_SCALE,
            Rgb::WHITE,
            SPEED_THICKNESS,
        )
    }
}

#[cfg(feature = "opencv")]
mod cv {
    use super::*;
    use opencv::{core, imgproc, prelude::*};

    impl Rgb {
        /// OpenCV scalars are BGR.
        #[inline]
        pub fn to_scalar(self) -> core::Scalar {
            core::Scalar::new(self.b as f64, self.g as f64, self.r as f64, 0.0)
        }
    }

    impl Canvas for core::Mat {
        #[inline]
        fn dims(&self) -> (u32, u32) {
            (self.cols() as u32, self.rows() as u32)
        }

        fn draw_rect(&mut self, bbox: &BBox<Ltrb>, color: Rgb, thickness: i32) -> Result<(), Error> {
            let [x1, y1, x2, y2] = bbox.pixels();
            let rect = core::Rect::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1));

            imgproc::rectangle(self, rect, color.to_scalar(), thickness, imgproc::LINE_8, 0)?;

            Ok(())
        }

        fn put_text(
            &mut self,
            text: &str,
            origin: na::Point2<i32>,
            scale: f32,
            color: Rgb,
            thickness: i32,
        ) -> Result<(), Error> {
            imgproc::put_text(
                self,
                text,
                core::Point::new(origin.x, origin.y),
                imgproc::FONT_HERSHEY_SIMPLEX,
                scale as f64,
                color.to_scalar(),
                thickness,
                imgproc::LINE_AA,
                false,
            )?;

            Ok(())
        }
    }
}
