use nalgebra as na;

/// m/s -> km/h
pub const MPS_TO_KMH: f32 = 3.6;

/// Converts frame-to-frame pixel displacement into km/h.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedEstimator {
    /// Meters per pixel.
    pub calibration_factor: f32,
}

impl SpeedEstimator {
    #[inline]
    pub fn new(calibration_factor: f32) -> Self {
        Self { calibration_factor }
    }

    /// `||current - prior|| * calibration_factor * fps * 3.6`.
    ///
    /// Zero when either position is missing, when `fps` is not a positive
    /// finite number, or when the result would not be finite.
    pub fn speed(
        &self,
        prior: Option<na::Point2<i32>>,
        current: Option<na::Point2<i32>>,
        fps: f32,
    ) -> f32 {
        let (prior, current) = match (prior, current) {
            (Some(prior), Some(current)) => (prior, current),
            _ => return 0.0,
        };

        if !fps.is_finite() || fps <= 0.0 {
            log::debug!("degenerate fps {}, speed reported as 0", fps);
            return 0.0;
        }

        let dx = (current.x as i64 - prior.x as i64) as f32;
        let dy = (current.y as i64 - prior.y as i64) as f32;
        let meters = dx.hypot(dy) * self.calibration_factor;
        let kmh = meters * fps * MPS_TO_KMH;

        if kmh.is_finite() {
            kmh
        } else {
            0.0
        }
    }
}
