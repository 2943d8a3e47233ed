use std::fmt::Debug;

use crate::error::CalibrationError;
use crate::my_types::*;
use crate::track::TrackSample;

/// What a distance model sees of an object in one frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Observation {
    /// pixel position of the object's anchor point
    pub position: Vector2d,
    /// normalized depth at the position, 1 being nearest
    pub depth: Option<f64>,
    /// bounding box width, pixels
    pub bbox_width: Option<f64>,
}

/// One-shot calibration. Once `Calibrated` the parameters never change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationState<P> {
    Uncalibrated,
    Calibrated(P),
}

impl<P> Default for CalibrationState<P> {
    fn default() -> Self {
        CalibrationState::Uncalibrated
    }
}

impl<P> CalibrationState<P> {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationState::Calibrated(_))
    }

    pub fn parameters(&self) -> Option<&P> {
        match self {
            CalibrationState::Calibrated(p) => Some(p),
            CalibrationState::Uncalibrated => None,
        }
    }

    pub fn set(&mut self, parameters: P) -> Result<(), CalibrationError> {
        if self.is_calibrated() {
            return Err(CalibrationError::AlreadyCalibrated);
        }
        *self = CalibrationState::Calibrated(parameters);
        Ok(())
    }
}

/// Admissible speeds in km/h. Estimates outside are discarded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
    pub inclusive: bool,
}

impl SpeedRange {
    pub fn contains(&self, speed: f64) -> bool {
        if self.inclusive {
            self.min <= speed && speed <= self.max
        } else {
            self.min < speed && speed < self.max
        }
    }
}

/// Which point of a detection box stands for the object's position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxAnchor {
    Center,
    /// ground contact point
    BottomCenter,
}

impl BoxAnchor {
    pub fn point(&self, bbox: &BoundingBox) -> Vector2d {
        match self {
            BoxAnchor::Center => bbox.center(),
            BoxAnchor::BottomCenter => bbox.bottom_center(),
        }
    }
}

/// Maps a pair of track samples to the metric distance travelled between
/// them.
pub trait DistanceModel: Debug {
    /// Called with every observation before it is recorded. Models that
    /// calibrate from live data do it here.
    fn observe(&mut self, _observation: &Observation) {}

    /// Whether the observation can be converted at all. Rejected
    /// observations are not recorded in the track history.
    fn accepts(&self, _observation: &Observation) -> bool {
        true
    }

    /// Meters travelled from `first` to `last`, or `None` when the model
    /// cannot tell yet.
    fn displacement_meters(&self, first: &TrackSample, last: &TrackSample) -> Option<f64>;

    fn speed_range(&self) -> SpeedRange;

    fn anchor(&self) -> BoxAnchor {
        BoxAnchor::Center
    }
}
