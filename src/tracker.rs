use anyhow::Result;
use log::debug;

use crate::config::{FeatureTrackerConfig, MotionConfig};
use crate::detector::Detector;
use crate::feature::FeaturePoint;
use crate::frame::PyramidFrame;
use crate::image::Image;
use crate::motion::MotionCompensator;
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;

/// Moving features of one frame
#[derive(Clone, Debug, Default)]
pub struct TrackedFeatures {
    pub points: Vec<FeaturePoint>,
    /// camera motion removed from every displacement, if any was detected
    pub camera_motion: Option<Vector2d>,
}

/// Frame-to-frame corner tracker. Holds the previous frame and its corners,
/// so one instance serves exactly one video stream.
pub struct FeatureTracker {
    detector: Detector,
    optical_flow: OpticalFlow,
    compensator: Option<MotionCompensator>,
    motion_threshold: f64,
    previous_frame: Option<PyramidFrame>,
    previous_features: Vec<Vector2d>,
    /// frame from two calls ago, its pyramid buffers are recycled
    spare_frame: Option<PyramidFrame>,
}

impl FeatureTracker {
    pub fn new(config: &FeatureTrackerConfig, motion: &MotionConfig) -> Self {
        FeatureTracker {
            detector: Detector::new(
                config.max_corners,
                config.quality_level,
                config.min_corner_distance,
                config.block_size,
            ),
            optical_flow: OpticalFlow::from_config(config),
            compensator: (!motion.disabled).then(|| MotionCompensator::new(motion)),
            motion_threshold: config.motion_threshold,
            previous_frame: None,
            previous_features: vec![],
            spare_frame: None,
        }
    }

    /// Track the previous corners into `gray` and reseed corners for the
    /// next call. The first frame only seeds and returns nothing.
    pub fn process(&mut self, gray: Image) -> Result<TrackedFeatures> {
        let frame = PyramidFrame::new(gray, self.optical_flow.levels(), self.spare_frame.take())?;

        let tracked = match self.previous_frame.take() {
            Some(previous)
                if previous.image.width == frame.image.width
                    && previous.image.height == frame.image.height =>
            {
                let tracked = self.track(&previous, &frame);
                self.spare_frame = Some(previous);
                tracked
            }
            Some(_) => {
                debug!("frame size changed, reseeding features");
                TrackedFeatures::default()
            }
            None => TrackedFeatures::default(),
        };

        self.previous_features = self.detector.detect(&frame.image, None);
        self.previous_frame = Some(frame);
        Ok(tracked)
    }

    fn track(&mut self, previous: &PyramidFrame, current: &PyramidFrame) -> TrackedFeatures {
        let camera_motion = self
            .compensator
            .as_mut()
            .and_then(|c| c.estimate(&mut self.optical_flow, previous, current));

        let tracked = self
            .optical_flow
            .process(previous, current, &self.previous_features);
        let points: Vec<FeaturePoint> = self
            .previous_features
            .iter()
            .zip(tracked)
            .filter_map(|(&old, new)| new.map(|new| FeaturePoint::new(old, new, camera_motion)))
            .filter(|p| p.magnitude > self.motion_threshold)
            .collect();
        debug!(
            "{} of {} features moving, camera motion {:?}",
            points.len(),
            self.previous_features.len(),
            camera_motion.map(|m| (m.x, m.y))
        );

        TrackedFeatures {
            points,
            camera_motion,
        }
    }

    /// Frame passed to the last `process` call
    pub fn latest_image(&self) -> Option<&Image> {
        self.previous_frame.as_ref().map(|f| &f.image)
    }

    /// Forget the previous frame; the next call only seeds features.
    pub fn reset(&mut self) {
        self.previous_frame = None;
        self.previous_features.clear();
    }
}
