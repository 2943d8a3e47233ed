use std::f64::consts::FRAC_PI_2;

use log::info;

use crate::config::CameraConfig;
use crate::distance::{BoxAnchor, CalibrationState, DistanceModel, Observation, SpeedRange};
use crate::error::{ensure_positive, CalibrationError, ProjectionError};
use crate::my_types::*;
use crate::track::TrackSample;

/// Sensor width of a full-frame camera, used with 35 mm equivalent focal
/// lengths.
pub const FULL_FRAME_SENSOR_WIDTH: f64 = 36.;

/// Camera mounting and optics, in the units people measure them in
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraGeometry {
    /// meters above the road
    pub camera_height: f64,
    /// degrees, positive looks down
    pub tilt_angle: f64,
    /// degrees, positive looks right
    pub pan_angle: f64,
    /// millimeters
    pub focal_length: f64,
    /// millimeters
    pub sensor_width: f64,
    pub image_width: usize,
    pub image_height: usize,
}

impl CameraGeometry {
    pub fn from_config(config: &CameraConfig, image_width: usize, image_height: usize) -> Self {
        CameraGeometry {
            camera_height: config.camera_height,
            tilt_angle: config.tilt_angle,
            pan_angle: config.pan_angle,
            focal_length: config.focal_length,
            sensor_width: config.sensor_width,
            image_width,
            image_height,
        }
    }
}

/// Derived projection parameters. Angles in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundCalibration {
    pub camera_height: f64,
    pub tilt: f64,
    pub pan: f64,
    pub focal_length: f64,
    pub sensor_width: f64,
    pub sensor_height: f64,
    pub image_width: f64,
    pub image_height: f64,
    pub fov_horizontal: f64,
    pub fov_vertical: f64,
    /// image row of the horizon; rows below it see the ground
    pub horizon_row: f64,
}

/// Iso-distance image row for one forward ground distance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLine {
    pub distance: f64,
    pub row: f64,
}

/// Flat-ground pinhole projection between image pixels and ground meters.
///
/// Ground coordinates are `(x, y)` with `x` to the right and `y` forward,
/// both in meters from the point below the camera. Pixel rays are split into
/// horizontal and vertical angles proportionally to the field of view.
#[derive(Clone, Debug, Default)]
pub struct GroundPlaneTransformer {
    calibration: CalibrationState<GroundCalibration>,
}

impl GroundPlaneTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calibrated(geometry: &CameraGeometry) -> Result<Self, CalibrationError> {
        let mut transformer = Self::new();
        transformer.calibrate(geometry)?;
        Ok(transformer)
    }

    pub fn calibrate(&mut self, geometry: &CameraGeometry) -> Result<(), CalibrationError> {
        ensure_positive("camera_height", geometry.camera_height)?;
        if !(-45. ..=90.).contains(&geometry.tilt_angle) {
            return Err(CalibrationError::TiltOutOfRange(geometry.tilt_angle));
        }
        ensure_positive("focal_length", geometry.focal_length)?;
        ensure_positive("sensor_width", geometry.sensor_width)?;
        ensure_positive("image_width", geometry.image_width as f64)?;
        ensure_positive("image_height", geometry.image_height as f64)?;
        if self.calibration.is_calibrated() {
            return Err(CalibrationError::AlreadyCalibrated);
        }

        let image_width = geometry.image_width as f64;
        let image_height = geometry.image_height as f64;
        let tilt = geometry.tilt_angle.to_radians();
        let sensor_height = geometry.sensor_width * image_height / image_width;
        let fov_horizontal = 2. * (geometry.sensor_width / (2. * geometry.focal_length)).atan();
        let fov_vertical = 2. * (sensor_height / (2. * geometry.focal_length)).atan();
        // ray elevation is zero where the vertical angle equals the tilt
        let horizon_row = -tilt / (fov_vertical / 2.) * (image_height / 2.) + image_height / 2.;

        self.calibration.set(GroundCalibration {
            camera_height: geometry.camera_height,
            tilt,
            pan: geometry.pan_angle.to_radians(),
            focal_length: geometry.focal_length,
            sensor_width: geometry.sensor_width,
            sensor_height,
            image_width,
            image_height,
            fov_horizontal,
            fov_vertical,
            horizon_row,
        })?;
        info!(
            "ground plane calibrated: fov {:.1}x{:.1} deg, horizon at row {horizon_row:.1}",
            fov_horizontal.to_degrees(),
            fov_vertical.to_degrees()
        );
        Ok(())
    }

    /// Calibrate from image metadata, preferring the 35 mm equivalent focal
    /// length on a full-frame sensor.
    pub fn calibrate_from_exif(
        &mut self,
        camera_height: f64,
        tilt_angle: f64,
        exif_focal_length: f64,
        exif_focal_length_35mm: Option<f64>,
        image_width: usize,
        image_height: usize,
    ) -> Result<(), CalibrationError> {
        self.calibrate(&CameraGeometry {
            camera_height,
            tilt_angle,
            pan_angle: 0.,
            focal_length: exif_focal_length_35mm.unwrap_or(exif_focal_length),
            sensor_width: FULL_FRAME_SENSOR_WIDTH,
            image_width,
            image_height,
        })
    }

    /// Hand-held phone at chest height, slightly tilted down
    pub fn typical_smartphone(image_width: usize, image_height: usize) -> Result<Self, CalibrationError> {
        Self::calibrated(&CameraGeometry {
            camera_height: 1.5,
            tilt_angle: 10.,
            pan_angle: 0.,
            focal_length: 26.,
            sensor_width: FULL_FRAME_SENSOR_WIDTH,
            image_width,
            image_height,
        })
    }

    /// Windshield camera
    pub fn dashcam(image_width: usize, image_height: usize) -> Result<Self, CalibrationError> {
        Self::calibrated(&CameraGeometry {
            camera_height: 1.2,
            tilt_angle: 5.,
            pan_angle: 0.,
            focal_length: 28.,
            sensor_width: FULL_FRAME_SENSOR_WIDTH,
            image_width,
            image_height,
        })
    }

    pub fn calibration(&self) -> Option<&GroundCalibration> {
        self.calibration.parameters()
    }

    fn parameters(&self) -> Result<&GroundCalibration, ProjectionError> {
        self.calibration.parameters().ok_or(ProjectionError::Uncalibrated)
    }

    pub fn horizon_row(&self) -> Result<f64, ProjectionError> {
        Ok(self.parameters()?.horizon_row)
    }

    /// Ground position in meters of the road point seen at `pixel`
    pub fn transform_point(&self, pixel: Vector2d) -> Result<Vector2d, ProjectionError> {
        let c = self.parameters()?;
        let half_width = c.image_width / 2.;
        let half_height = c.image_height / 2.;
        let norm_x = (pixel.x - half_width) / half_width;
        let norm_y = (pixel.y - half_height) / half_height;

        let alpha = norm_x * c.fov_horizontal / 2.;
        let beta = -norm_y * c.fov_vertical / 2.;
        let elevation = beta - c.tilt;
        if elevation >= 0. {
            return Err(ProjectionError::AboveHorizon { x: pixel.x, y: pixel.y });
        }
        // steeper than straight down
        if elevation <= -FRAC_PI_2 {
            return Err(ProjectionError::BehindCamera { x: pixel.x, y: pixel.y });
        }

        let forward = c.camera_height / (-elevation).tan();
        Ok(Vector2d::new(forward * (alpha + c.pan).tan(), forward))
    }

    pub fn transform_points(&self, pixels: &[Vector2d]) -> Vec<Result<Vector2d, ProjectionError>> {
        pixels.iter().map(|&p| self.transform_point(p)).collect()
    }

    /// Meters between the road points seen at two pixels
    pub fn distance(&self, a: Vector2d, b: Vector2d) -> Result<f64, ProjectionError> {
        Ok((self.transform_point(b)? - self.transform_point(a)?).norm())
    }

    /// Pixel where the road point at `ground` appears. The point must be in
    /// front of the camera.
    pub fn pixel_from_ground(&self, ground: Vector2d) -> Result<Vector2d, ProjectionError> {
        let c = self.parameters()?;
        if ground.y <= 0. {
            return Err(ProjectionError::BehindCamera { x: ground.x, y: ground.y });
        }
        let elevation = -(c.camera_height / ground.y).atan();
        let beta = elevation + c.tilt;
        let norm_y = -beta / (c.fov_vertical / 2.);

        let alpha = (ground.x / ground.y).atan() - c.pan;
        let norm_x = alpha / (c.fov_horizontal / 2.);

        let half_width = c.image_width / 2.;
        let half_height = c.image_height / 2.;
        Ok(Vector2d::new(
            norm_x * half_width + half_width,
            norm_y * half_height + half_height,
        ))
    }

    /// Image rows at the given forward distances. Distances whose row falls
    /// outside the image are left out.
    pub fn metric_grid(&self, distances: &[f64]) -> Result<Vec<GridLine>, ProjectionError> {
        let c = self.parameters()?;
        let mut lines = vec![];
        for &distance in distances {
            let Ok(pixel) = self.pixel_from_ground(Vector2d::new(0., distance)) else {
                continue;
            };
            if pixel.y >= 0. && pixel.y < c.image_height && pixel.y > c.horizon_row {
                lines.push(GridLine { distance, row: pixel.y });
            }
        }
        Ok(lines)
    }
}

impl DistanceModel for GroundPlaneTransformer {
    fn accepts(&self, observation: &Observation) -> bool {
        self.transform_point(observation.position).is_ok()
    }

    fn displacement_meters(&self, first: &TrackSample, last: &TrackSample) -> Option<f64> {
        self.distance(first.position, last.position).ok()
    }

    fn speed_range(&self) -> SpeedRange {
        SpeedRange {
            min: 0.,
            max: 200.,
            inclusive: false,
        }
    }

    fn anchor(&self) -> BoxAnchor {
        BoxAnchor::BottomCenter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn geometry(camera_height: f64, tilt_angle: f64) -> CameraGeometry {
        CameraGeometry {
            camera_height,
            tilt_angle,
            pan_angle: 0.,
            focal_length: 26.,
            sensor_width: 36.,
            image_width: 1920,
            image_height: 1080,
        }
    }

    #[test]
    fn test_uncalibrated() {
        let transformer = GroundPlaneTransformer::new();
        assert_eq!(transformer.horizon_row(), Err(ProjectionError::Uncalibrated));
        assert_eq!(
            transformer.transform_point(Vector2d::new(960., 1000.)),
            Err(ProjectionError::Uncalibrated)
        );
        assert_eq!(transformer.metric_grid(&[10.]), Err(ProjectionError::Uncalibrated));
    }

    #[test]
    fn test_invalid_calibration() {
        let mut transformer = GroundPlaneTransformer::new();
        assert!(matches!(
            transformer.calibrate(&geometry(0., 10.)),
            Err(CalibrationError::NotPositive { name: "camera_height", .. })
        ));
        assert_eq!(
            transformer.calibrate(&geometry(1.4, 95.)),
            Err(CalibrationError::TiltOutOfRange(95.))
        );
        assert_eq!(
            transformer.calibrate(&geometry(1.4, -46.)),
            Err(CalibrationError::TiltOutOfRange(-46.))
        );
        let mut bad_focal = geometry(1.4, 10.);
        bad_focal.focal_length = -1.;
        assert!(transformer.calibrate(&bad_focal).is_err());
        let mut bad_sensor = geometry(1.4, 10.);
        bad_sensor.sensor_width = 0.;
        assert!(transformer.calibrate(&bad_sensor).is_err());
        // failed attempts leave it uncalibrated
        assert!(transformer.calibration().is_none());

        transformer.calibrate(&geometry(1.4, 10.)).unwrap();
        assert_eq!(
            transformer.calibrate(&geometry(1.5, 10.)),
            Err(CalibrationError::AlreadyCalibrated)
        );
        assert_eq!(transformer.calibration().unwrap().camera_height, 1.4);
    }

    #[test]
    fn test_horizon_decreases_with_tilt() {
        let mut previous = f64::INFINITY;
        for tilt in [-40., -14., 0., 5., 10., 30., 60., 90.] {
            let horizon = GroundPlaneTransformer::calibrated(&geometry(1.4, tilt))
                .unwrap()
                .horizon_row()
                .unwrap();
            assert!(horizon < previous);
            previous = horizon;
        }
        let level = GroundPlaneTransformer::calibrated(&geometry(1.4, 0.)).unwrap();
        assert_abs_diff_eq!(level.horizon_row().unwrap(), 540., epsilon = 1e-9);
    }

    #[test]
    fn test_horizon_independent_of_height() {
        let low = GroundPlaneTransformer::calibrated(&geometry(0.5, 12.)).unwrap();
        let high = GroundPlaneTransformer::calibrated(&geometry(20., 12.)).unwrap();
        assert_eq!(low.horizon_row(), high.horizon_row());
    }

    #[test]
    fn test_below_and_above_horizon() {
        let transformer = GroundPlaneTransformer::calibrated(&geometry(1.4, 10.)).unwrap();
        let horizon = transformer.horizon_row().unwrap();
        for row in [horizon + 0.5, horizon + 100., 1079.] {
            for column in [0., 960., 1919.] {
                let ground = transformer.transform_point(Vector2d::new(column, row)).unwrap();
                assert!(ground.y > 0.);
            }
        }
        for row in [horizon - 0.01, horizon - 0.5, 0.] {
            assert!(matches!(
                transformer.transform_point(Vector2d::new(960., row)),
                Err(ProjectionError::AboveHorizon { .. })
            ));
        }
        // lower rows are nearer
        let near = transformer.transform_point(Vector2d::new(960., 1000.)).unwrap();
        let far = transformer.transform_point(Vector2d::new(960., 500.)).unwrap();
        assert!(near.y < far.y);
        assert_abs_diff_eq!(near.x, 0., epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let mut g = geometry(1.6, 12.);
        g.pan_angle = 5.;
        let transformer = GroundPlaneTransformer::calibrated(&g).unwrap();
        for pixel in [
            Vector2d::new(960., 800.),
            Vector2d::new(100., 1000.),
            Vector2d::new(1800., 450.),
            Vector2d::new(640., 1079.),
        ] {
            let ground = transformer.transform_point(pixel).unwrap();
            let back = transformer.pixel_from_ground(ground).unwrap();
            assert_abs_diff_eq!(back, pixel, epsilon = 1e-6);
        }
        for ground in [Vector2d::new(0., 10.), Vector2d::new(-3., 25.), Vector2d::new(4., 7.)] {
            let pixel = transformer.pixel_from_ground(ground).unwrap();
            let again = transformer.transform_point(pixel).unwrap();
            assert_abs_diff_eq!(again, ground, epsilon = 1e-6);
        }
        assert!(matches!(
            transformer.pixel_from_ground(Vector2d::new(1., -2.)),
            Err(ProjectionError::BehindCamera { .. })
        ));
    }

    #[test]
    fn test_upward_tilt_fixture() {
        let transformer = GroundPlaneTransformer::calibrated(&geometry(1.4, -14.)).unwrap();
        let c = *transformer.calibration().unwrap();
        let fov_vertical = 2. * (20.25f64 / 52.).atan();
        assert_abs_diff_eq!(c.fov_vertical, fov_vertical, epsilon = 1e-12);
        assert_abs_diff_eq!(c.fov_horizontal, 2. * (36f64 / 52.).atan(), epsilon = 1e-12);

        let horizon = 540. + 14f64.to_radians() / (fov_vertical / 2.) * 540.;
        assert_abs_diff_eq!(transformer.horizon_row().unwrap(), horizon, epsilon = 1e-9);
        assert_abs_diff_eq!(horizon, 895.31, epsilon = 0.01);

        // a camera looking up sees the road only in the bottom of the frame;
        // 70% down is still sky
        assert!(matches!(
            transformer.transform_point(Vector2d::new(960., 0.7 * 1080.)),
            Err(ProjectionError::AboveHorizon { .. })
        ));

        // 90% down: closed-form forward distance
        let row = 0.9 * 1080.;
        let elevation = -((row - 540.) / 540.) * fov_vertical / 2. + 14f64.to_radians();
        let expected = 1.4 / (-elevation).tan();
        let ground = transformer.transform_point(Vector2d::new(960., row)).unwrap();
        assert_abs_diff_eq!(ground.y, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(ground.y, 26.52, epsilon = 0.01);
        assert_abs_diff_eq!(ground.x, 0., epsilon = 1e-12);
    }

    #[test]
    fn test_downward_tilt_fixture() {
        let transformer = GroundPlaneTransformer::calibrated(&geometry(1.4, 10.)).unwrap();
        assert_abs_diff_eq!(transformer.horizon_row().unwrap(), 286.21, epsilon = 0.01);
        let ground = transformer.transform_point(Vector2d::new(960., 0.7 * 1080.)).unwrap();
        assert_abs_diff_eq!(ground.y, 4.18, epsilon = 0.01);
    }

    #[test]
    fn test_steep_tilt_rows_past_nadir() {
        let transformer = GroundPlaneTransformer::calibrated(&geometry(1.4, 80.)).unwrap();
        // the whole image is below the horizon
        assert!(transformer.horizon_row().unwrap() < 0.);

        let center = transformer.transform_point(Vector2d::new(960., 540.)).unwrap();
        assert_abs_diff_eq!(center.y, 1.4 / 80f64.to_radians().tan(), epsilon = 1e-9);
        assert!(transformer.transform_point(Vector2d::new(960., 700.)).unwrap().y > 0.);

        // rays past straight down, from about row 794 on, do not reach the ground ahead
        assert_eq!(
            transformer.transform_point(Vector2d::new(960., 900.)),
            Err(ProjectionError::BehindCamera { x: 960., y: 900. })
        );
    }

    #[test]
    fn test_distance_between_pixels() {
        let transformer = GroundPlaneTransformer::calibrated(&geometry(1.4, 10.)).unwrap();
        let a = Vector2d::new(960., 900.);
        let b = Vector2d::new(960., 700.);
        let d = transformer.distance(a, b).unwrap();
        let ya = transformer.transform_point(a).unwrap().y;
        let yb = transformer.transform_point(b).unwrap().y;
        assert_abs_diff_eq!(d, yb - ya, epsilon = 1e-9);
        assert!(transformer.distance(a, Vector2d::new(960., 100.)).is_err());

        let batch = transformer.transform_points(&[a, Vector2d::new(960., 100.)]);
        assert!(batch[0].is_ok());
        assert!(batch[1].is_err());
    }

    #[test]
    fn test_metric_grid() {
        let transformer = GroundPlaneTransformer::calibrated(&geometry(1.4, 10.)).unwrap();
        let horizon = transformer.horizon_row().unwrap();
        let lines = transformer.metric_grid(&[1., 2., 3., 5., 10., 50., -3.]).unwrap();
        // 1 and 2 m fall below the bottom edge, -3 m is behind the camera
        let distances: Vec<f64> = lines.iter().map(|l| l.distance).collect();
        assert_eq!(distances, vec![3., 5., 10., 50.]);
        for pair in lines.windows(2) {
            assert!(pair[0].row > pair[1].row);
        }
        for line in &lines {
            assert!(line.row > horizon && line.row < 1080.);
            let ground = transformer.transform_point(Vector2d::new(960., line.row)).unwrap();
            assert_abs_diff_eq!(ground.y, line.distance, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_presets_and_exif() {
        let phone = GroundPlaneTransformer::typical_smartphone(1920, 1080).unwrap();
        let c = phone.calibration().unwrap();
        assert_eq!(c.camera_height, 1.5);
        assert_eq!(c.focal_length, 26.);
        let dashcam = GroundPlaneTransformer::dashcam(1920, 1080).unwrap();
        assert_eq!(dashcam.calibration().unwrap().focal_length, 28.);

        let mut exif = GroundPlaneTransformer::new();
        exif.calibrate_from_exif(1.4, 8., 4.2, Some(24.), 4000, 3000).unwrap();
        let c = exif.calibration().unwrap();
        assert_eq!(c.focal_length, 24.);
        assert_eq!(c.sensor_width, 36.);
        assert_abs_diff_eq!(c.sensor_height, 27., epsilon = 1e-12);

        let mut exif = GroundPlaneTransformer::new();
        exif.calibrate_from_exif(1.4, 8., 4.2, None, 4000, 3000).unwrap();
        assert_eq!(exif.calibration().unwrap().focal_length, 4.2);
    }
}
