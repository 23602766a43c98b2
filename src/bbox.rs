use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Largest absolute pixel coordinate a detection box may carry.
pub const MAX_PIXEL_COORD: f32 = 1_048_576.0;

pub trait BBoxFormat: std::fmt::Debug + Clone + Copy + PartialEq {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// X-y-width-height format, contains coordinates of the center of bbox and width-height
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Xywh;
impl BBoxFormat for Xywh {}

/// Box in pixel coordinates, serialized as a plain `[f32; 4]`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(into = "[f32; 4]", from = "[f32; 4]")]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> From<BBox<F>> for [f32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> From<[f32; 4]> for BBox<F> {
    fn from(slice: [f32; 4]) -> Self {
        BBox(slice, PhantomData)
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        BBox([x1, y1, x2, y2], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.right() - self.left()
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.bottom() - self.top()
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// `true` when the corners are finite and strictly ordered (x1 < x2, y1 < y2).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.left() < self.right() && self.top() < self.bottom()
    }

    /// `true` when every corner lies within `±MAX_PIXEL_COORD`.
    #[inline]
    pub fn in_pixel_range(&self) -> bool {
        self.0.iter().all(|v| v.abs() <= MAX_PIXEL_COORD)
    }

    /// Corners truncated to whole pixels: `(x1, y1, x2, y2)`.
    #[inline]
    pub fn pixels(&self) -> [i32; 4] {
        [
            self.left() as i32,
            self.top() as i32,
            self.right() as i32,
            self.bottom() as i32,
        ]
    }

    /// Top-left corner in whole pixels.
    #[inline]
    pub fn corner(&self) -> na::Point2<i32> {
        let [x1, y1, _, _] = self.pixels();
        na::Point2::new(x1, y1)
    }

    /// Center in whole pixels, computed on truncated corners with floor division.
    #[inline]
    pub fn center(&self) -> na::Point2<i32> {
        let [x1, y1, x2, y2] = self.pixels();
        let mid = |a: i32, b: i32| (a as i64 + b as i64).div_euclid(2) as i32;

        na::Point2::new(mid(x1, x2), mid(y1, y2))
    }

    #[inline]
    pub fn as_xywh(&self) -> BBox<Xywh> {
        self.into()
    }

    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let i_l = self.left().max(other.left());
        let i_t = self.top().max(other.top());
        let i_r = self.right().min(other.right());
        let i_b = self.bottom().min(other.bottom());
        let i_area = (i_r - i_l).max(0.) * (i_b - i_t).max(0.);
        let union = self.area() + other.area() - i_area;

        if union <= 0.0 {
            0.0
        } else {
            i_area / union
        }
    }
}

impl BBox<Xywh> {
    #[inline]
    pub fn xywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        BBox([cx, cy, width, height], PhantomData)
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Xywh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        Self(
            [
                v.0[0] + (v.0[2] - v.0[0]) / 2.0,
                v.0[1] + (v.0[3] - v.0[1]) / 2.0,
                v.0[2] - v.0[0],
                v.0[3] - v.0[1],
            ],
            PhantomData,
        )
    }
}

impl<'a> From<&'a BBox<Xywh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xywh>) -> Self {
        let w2 = v.0[2] / 2.0;
        let h2 = v.0[3] / 2.0;

        Self(
            [v.0[0] - w2, v.0[1] - h2, v.0[0] + w2, v.0[1] + h2],
            PhantomData,
        )
    }
}
