use log::debug;

use crate::config::MotionConfig;
use crate::detector::Detector;
use crate::frame::PyramidFrame;
use crate::math::median;
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;

/// Estimates the camera-induced shift between two frames from features in
/// the outer border band, where the scene is assumed to be static.
pub struct MotionCompensator {
    border_fraction: f64,
    min_points: usize,
    min_camera_motion: f64,
    detector: Detector,
    mask: Vec<bool>,
    mask_shape: (usize, usize),
}

impl MotionCompensator {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            border_fraction: config.border_fraction,
            min_points: config.min_border_points,
            min_camera_motion: config.min_camera_motion,
            detector: Detector::new(config.border_max_corners, 0.01, config.border_min_distance, 3),
            mask: vec![],
            mask_shape: (0, 0),
        }
    }

    /// Median displacement of the border features, or `None` when there are
    /// too few of them or the motion is not significant.
    pub fn estimate(
        &mut self,
        flow: &mut OpticalFlow,
        frame0: &PyramidFrame,
        frame1: &PyramidFrame,
    ) -> Option<Vector2d> {
        let (w, h) = (frame0.image.width, frame0.image.height);
        if (w, h) != (frame1.image.width, frame1.image.height) {
            debug!("frame size changed, skipping motion compensation");
            return None;
        }
        self.update_mask(w, h);

        let points0 = self.detector.detect(&frame0.image, Some(&self.mask));
        if points0.len() < self.min_points {
            debug!("only {} border features, no compensation", points0.len());
            return None;
        }

        let tracked = flow.process(frame0, frame1, &points0);
        let (dx, dy): (Vec<f64>, Vec<f64>) = points0
            .iter()
            .zip(&tracked)
            .filter_map(|(p0, p1)| p1.map(|p1| (p1.x - p0.x, p1.y - p0.y)))
            .unzip();
        if dx.len() < self.min_points {
            debug!("only {} border features tracked, no compensation", dx.len());
            return None;
        }

        let motion = Vector2d::new(median(&dx)?, median(&dy)?);
        if motion.norm() > self.min_camera_motion {
            Some(motion)
        } else {
            None
        }
    }

    fn update_mask(&mut self, w: usize, h: usize) {
        if self.mask_shape == (w, h) {
            return;
        }
        self.mask = border_mask(w, h, self.border_fraction);
        self.mask_shape = (w, h);
    }
}

/// Row-major mask that is true on a band of `fraction * min(w, h)` pixels
/// along every edge.
pub fn border_mask(w: usize, h: usize, fraction: f64) -> Vec<bool> {
    let border = (usize::min(w, h) as f64 * fraction) as usize;
    let mut mask = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            mask[y * w + x] = y < border || y + border >= h || x < border || x + border >= w;
        }
    }
    mask
}
