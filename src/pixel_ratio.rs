use log::info;

use crate::distance::{CalibrationState, DistanceModel, Observation, SpeedRange};
use crate::error::{ensure_positive, CalibrationError};
use crate::track::TrackSample;

/// Fixed pixels-per-meter scale taken from the first detection box, assumed
/// to be `reference_width` meters wide. Later boxes never refine it.
#[derive(Clone, Debug)]
pub struct PixelRatioModel {
    reference_width: f64,
    pixels_per_meter: CalibrationState<f64>,
}

impl PixelRatioModel {
    pub fn new(reference_width: f64) -> Result<Self, CalibrationError> {
        ensure_positive("reference_width", reference_width)?;
        Ok(Self {
            reference_width,
            pixels_per_meter: CalibrationState::Uncalibrated,
        })
    }

    pub fn pixels_per_meter(&self) -> Option<f64> {
        self.pixels_per_meter.parameters().copied()
    }
}

impl DistanceModel for PixelRatioModel {
    fn observe(&mut self, observation: &Observation) {
        if self.pixels_per_meter.is_calibrated() {
            return;
        }
        let Some(width) = observation.bbox_width.filter(|&w| w > 0.) else {
            return;
        };
        let ratio = width / self.reference_width;
        if self.pixels_per_meter.set(ratio).is_ok() {
            info!("pixel ratio calibrated: {ratio:.2} px/m");
        }
    }

    fn displacement_meters(&self, first: &TrackSample, last: &TrackSample) -> Option<f64> {
        let ratio = self.pixels_per_meter()?;
        Some((last.position - first.position).norm() / ratio)
    }

    fn speed_range(&self) -> SpeedRange {
        SpeedRange {
            min: 0.,
            max: 200.,
            inclusive: false,
        }
    }
}
