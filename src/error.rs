use thiserror::Error;

/// Invalid calibration input. Raised once, at calibration time; the model
/// stays uncalibrated afterwards.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("tilt_angle must be between -45 and 90 degrees, got {0}")]
    TiltOutOfRange(f64),

    #[error("reference depth must be within [0, 1], got {0}")]
    DepthOutOfRange(f64),

    #[error("reference distance and reference depth must be given together")]
    IncompleteReference,

    #[error("model is already calibrated")]
    AlreadyCalibrated,
}

/// Per-point failure of the ground-plane projection. Callers skip the point.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ProjectionError {
    #[error("transformer must be calibrated before projecting points")]
    Uncalibrated,

    #[error("point ({x}, {y}) corresponds to a ray above the horizon")]
    AboveHorizon { x: f64, y: f64 },

    #[error("ground point ({x}, {y}) is not in front of the camera")]
    BehindCamera { x: f64, y: f64 },
}

pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<(), CalibrationError> {
    // NaN fails this check as well
    if value > 0. {
        Ok(())
    } else {
        Err(CalibrationError::NotPositive { name, value })
    }
}
