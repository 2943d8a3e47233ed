use log::info;

use crate::config::DepthConfig;
use crate::distance::{CalibrationState, DistanceModel, SpeedRange};
use crate::error::{ensure_positive, CalibrationError};
use crate::track::TrackSample;

/// Used when no focal length in pixels is configured
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 1600.;

/// Linear inverse mapping `distance = scale * (1 - depth) + offset`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthCalibration {
    pub scale: f64,
    pub offset: f64,
}

/// Converts normalized depth into meters and pixel displacement into metric
/// displacement by similar triangles.
#[derive(Clone, Debug)]
pub struct DepthDistanceModel {
    calibration: CalibrationState<DepthCalibration>,
    min_distance: f64,
    max_distance: f64,
    focal_length_px: f64,
}

impl DepthDistanceModel {
    pub fn new(config: &DepthConfig) -> Result<Self, CalibrationError> {
        ensure_positive("min_distance", config.min_distance)?;
        ensure_positive("max_distance", config.max_distance)?;
        let focal_length_px = config.focal_length_px.unwrap_or(DEFAULT_FOCAL_LENGTH_PX);
        ensure_positive("focal_length_px", focal_length_px)?;

        let mut model = DepthDistanceModel {
            calibration: CalibrationState::Uncalibrated,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            focal_length_px,
        };
        match (config.reference_distance, config.reference_depth) {
            (Some(distance), Some(depth)) => model.calibrate(distance, depth)?,
            (None, None) => {}
            _ => return Err(CalibrationError::IncompleteReference),
        }
        Ok(model)
    }

    /// Derive the linear mapping from one object at a known distance.
    pub fn calibrate(&mut self, reference_distance: f64, reference_depth: f64) -> Result<(), CalibrationError> {
        ensure_positive("reference_distance", reference_distance)?;
        if !(0. ..=1.).contains(&reference_depth) {
            return Err(CalibrationError::DepthOutOfRange(reference_depth));
        }
        self.calibration.set(DepthCalibration {
            scale: reference_distance / (1. - reference_depth + 0.01),
            offset: self.min_distance,
        })?;
        info!("depth calibrated: {reference_distance} m at depth {reference_depth:.3}");
        Ok(())
    }

    pub fn calibration(&self) -> &CalibrationState<DepthCalibration> {
        &self.calibration
    }

    pub fn focal_length_px(&self) -> f64 {
        self.focal_length_px
    }

    /// Meters to an object at normalized `depth`, clamped to the configured
    /// distance range.
    pub fn distance(&self, depth: f64) -> f64 {
        let distance = match self.calibration.parameters() {
            Some(c) => c.scale * (1. - depth) + c.offset,
            None => heuristic_distance(depth),
        };
        distance.clamp(self.min_distance, self.max_distance)
    }
}

/// Piecewise-linear guess for an uncalibrated traffic camera:
/// depth 1.0..0.8 covers 10..20 m, 0.8..0.4 covers 20..50 m and 0.4..0 covers
/// 50..80 m.
fn heuristic_distance(depth: f64) -> f64 {
    if depth > 0.8 {
        10. + (1. - depth) * 50.
    } else if depth > 0.4 {
        20. + (0.8 - depth) * 75.
    } else {
        50. + (0.4 - depth) * 75.
    }
}

impl DistanceModel for DepthDistanceModel {
    fn displacement_meters(&self, first: &TrackSample, last: &TrackSample) -> Option<f64> {
        let depth = (first.depth? + last.depth?) / 2.;
        let pixels = (last.position - first.position).norm();
        Some(pixels * self.distance(depth) / self.focal_length_px)
    }

    fn speed_range(&self) -> SpeedRange {
        SpeedRange {
            min: 5.,
            max: 120.,
            inclusive: true,
        }
    }
}
