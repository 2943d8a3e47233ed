use std::collections::BTreeMap;

use anyhow::{Context as AnyhowContext, Result};
use log::debug;
use serde::Serialize;
use tracing::instrument;

use crate::association::TrackAssociator;
use crate::cluster::ObjectClusterer;
use crate::config::Config;
use crate::depth_map::{DepthCache, DepthEstimator};
use crate::depth_model::DepthDistanceModel;
use crate::distance::{DistanceModel, Observation};
use crate::error::CalibrationError;
use crate::image::Image;
use crate::my_types::*;
use crate::speed::SpeedEstimator;
use crate::track::{evict_stale, Track, TrackTable};
use crate::tracker::FeatureTracker;

/// One object detection from an external detector
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// identity assigned by the detector's own tracker
    pub track_id: Option<u64>,
    pub class_label: u32,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    /// position fed to the distance model
    pub position: Vector2d,
    pub depth: Option<f64>,
    /// km/h, when one could be given this frame
    pub speed_kmh: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: usize,
    /// seconds
    pub timestamp: f64,
    pub objects: Vec<TrackedObject>,
    pub camera_motion: Option<Vector2d>,
}

/// Statistics over the latest speed of every object seen so far
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpeedSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl SpeedSummary {
    pub fn from_speeds(speeds: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0;
        let mut sum = 0.;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for speed in speeds {
            count += 1;
            sum += speed;
            min = min.min(speed);
            max = max.max(speed);
        }
        (count > 0).then(|| SpeedSummary {
            count,
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

/// Feed one observation through the estimator, remembering emitted speeds
/// beyond the track's lifetime.
fn estimate<M: DistanceModel>(
    estimator: &mut SpeedEstimator<M>,
    track: &mut Track,
    observation: Observation,
    timestamp: f64,
    speeds: &mut BTreeMap<TrackId, f64>,
) -> Option<f64> {
    let speed = estimator.update(track, observation, timestamp)?;
    speeds.insert(track.id, speed);
    Some(speed)
}

/// Self-tracking engine for raw video: optical-flow features are clustered
/// into objects, associated into tracks and measured with the depth model.
pub struct DepthSpeedPipeline {
    fps: f64,
    tracker: FeatureTracker,
    depth_cache: DepthCache,
    clusterer: ObjectClusterer,
    associator: TrackAssociator,
    estimator: SpeedEstimator<DepthDistanceModel>,
    tracks: TrackTable,
    speeds: BTreeMap<TrackId, f64>,
}

impl DepthSpeedPipeline {
    pub fn new(config: &Config) -> Result<Self, CalibrationError> {
        crate::error::ensure_positive("fps", config.fps)?;
        Ok(Self {
            fps: config.fps,
            tracker: FeatureTracker::new(&config.feature_tracker, &config.motion),
            depth_cache: DepthCache::new(config.depth_refresh_interval),
            clusterer: ObjectClusterer::new(&config.cluster),
            associator: TrackAssociator::new(&config.association),
            estimator: SpeedEstimator::new(DepthDistanceModel::new(&config.depth)?, &config.speed),
            tracks: TrackTable::new(),
            speeds: BTreeMap::new(),
        })
    }

    /// Process one grayscale frame. Frames must arrive in order.
    #[instrument(skip_all, fields(frame = frame_index))]
    pub fn process_frame(
        &mut self,
        frame_index: usize,
        gray: Image,
        depth_estimator: &mut dyn DepthEstimator,
    ) -> Result<FrameReport> {
        let timestamp = frame_index as f64 / self.fps;
        // the tracker sees every frame, even when depth estimation fails
        let features = self.tracker.process(gray)?;
        let gray = self.tracker.latest_image().context("tracker holds no frame")?;
        let depth = self
            .depth_cache
            .get(frame_index, gray, depth_estimator)
            .context("depth estimation failed")?;
        let candidates = self.clusterer.cluster(&features.points, Some(depth));
        debug!(
            "{} moving features, {} object candidates",
            features.points.len(),
            candidates.len()
        );

        let mut objects = vec![];
        for (track_id, candidate) in self.associator.associate(&mut self.tracks, candidates, frame_index) {
            let Some(track) = self.tracks.get_mut(&track_id) else {
                continue;
            };
            let observation = Observation {
                position: candidate.center,
                depth: candidate.depth,
                bbox_width: Some(candidate.bounding_box.width()),
            };
            let speed_kmh = estimate(&mut self.estimator, track, observation, timestamp, &mut self.speeds);
            objects.push(TrackedObject {
                track_id,
                bbox: candidate.bounding_box,
                position: candidate.center,
                depth: candidate.depth,
                speed_kmh,
            });
        }

        Ok(FrameReport {
            frame_index,
            timestamp,
            objects,
            camera_motion: features.camera_motion,
        })
    }

    pub fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    pub fn model(&self) -> &DepthDistanceModel {
        self.estimator.model()
    }

    /// Latest emitted speed per track, evicted tracks included
    pub fn speed_estimates(&self) -> &BTreeMap<TrackId, f64> {
        &self.speeds
    }

    pub fn summary(&self) -> Option<SpeedSummary> {
        SpeedSummary::from_speeds(self.speeds.values().copied())
    }
}

/// Engine for externally detected and tracked vehicles, generic over the
/// distance model that turns box positions into meters.
pub struct DetectionSpeedPipeline<M: DistanceModel> {
    fps: f64,
    vehicle_classes: Vec<u32>,
    timeout: usize,
    estimator: SpeedEstimator<M>,
    tracks: TrackTable,
    speeds: BTreeMap<TrackId, f64>,
}

impl<M: DistanceModel> DetectionSpeedPipeline<M> {
    pub fn new(model: M, config: &Config) -> Result<Self, CalibrationError> {
        crate::error::ensure_positive("fps", config.fps)?;
        Ok(Self {
            fps: config.fps,
            // empty admits every class
            vehicle_classes: if config.all_classes {
                vec![]
            } else {
                config.vehicle_classes.clone()
            },
            timeout: config.association.track_timeout,
            estimator: SpeedEstimator::new(model, &config.speed),
            tracks: TrackTable::new(),
            speeds: BTreeMap::new(),
        })
    }

    fn is_vehicle(&self, class_label: u32) -> bool {
        self.vehicle_classes.is_empty() || self.vehicle_classes.contains(&class_label)
    }

    #[instrument(skip_all, fields(frame = frame_index))]
    pub fn process_frame(&mut self, frame_index: usize, detections: &[Detection]) -> FrameReport {
        let timestamp = frame_index as f64 / self.fps;
        for id in evict_stale(&mut self.tracks, frame_index, self.timeout) {
            debug!("track {id} timed out");
        }

        let anchor = self.estimator.model().anchor();
        let mut objects = vec![];
        for detection in detections {
            if !self.is_vehicle(detection.class_label) {
                continue;
            }
            let Some(id) = detection.track_id else {
                debug!("skipping detection without track id");
                continue;
            };
            let track_id = TrackId(id);
            let track = self
                .tracks
                .entry(track_id)
                .or_insert_with(|| Track::new(track_id, frame_index));
            track.last_seen_frame = frame_index;

            let position = anchor.point(&detection.bbox);
            let observation = Observation {
                position,
                depth: None,
                bbox_width: Some(detection.bbox.width()),
            };
            let speed_kmh = estimate(&mut self.estimator, track, observation, timestamp, &mut self.speeds);
            objects.push(TrackedObject {
                track_id,
                bbox: detection.bbox,
                position,
                depth: None,
                speed_kmh,
            });
        }

        FrameReport {
            frame_index,
            timestamp,
            objects,
            camera_motion: None,
        }
    }

    pub fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    pub fn model(&self) -> &M {
        self.estimator.model()
    }

    /// Latest emitted speed per track, evicted tracks included
    pub fn speed_estimates(&self) -> &BTreeMap<TrackId, f64> {
        &self.speeds
    }

    pub fn summary(&self) -> Option<SpeedSummary> {
        SpeedSummary::from_speeds(self.speeds.values().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth_map::DepthMap;
    use crate::ground_plane::{CameraGeometry, GroundPlaneTransformer};
    use crate::pixel_ratio::PixelRatioModel;
    use approx::assert_abs_diff_eq;

    fn car(id: Option<u64>, class_label: u32, x: f64) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, 600., x + 180., 700.),
            track_id: id,
            class_label,
            confidence: 0.9,
        }
    }

    fn ratio_pipeline() -> DetectionSpeedPipeline<PixelRatioModel> {
        let config = Config::default();
        let model = PixelRatioModel::new(config.reference_width).unwrap();
        DetectionSpeedPipeline::new(model, &config).unwrap()
    }

    /// Fails on the second call only
    struct FlakyDepth {
        calls: usize,
    }

    impl DepthEstimator for FlakyDepth {
        fn estimate(&mut self, frame: &Image) -> Result<DepthMap> {
            self.calls += 1;
            if self.calls == 2 {
                anyhow::bail!("depth model unavailable");
            }
            DepthMap::new(ndarray::Array2::from_elem((frame.height, frame.width), 0.5))
        }
    }

    #[test]
    fn test_failed_depth_keeps_tracker_in_step() {
        let config = Config {
            depth_refresh_interval: 1,
            ..Default::default()
        };
        let mut pipeline = DepthSpeedPipeline::new(&config).unwrap();
        let mut depth = FlakyDepth { calls: 0 };
        let gray = |value: u8| Image::new(vec![value; 320 * 240], 320, 240).unwrap();

        pipeline.process_frame(0, gray(10), &mut depth).unwrap();
        assert!(pipeline.process_frame(1, gray(20), &mut depth).is_err());
        // frame 1 still reached the tracker
        assert!(pipeline.tracker.latest_image().unwrap().data.iter().all(|&v| v == 20));

        let report = pipeline.process_frame(2, gray(30), &mut depth).unwrap();
        assert_eq!(report.frame_index, 2);
        assert!(pipeline.tracker.latest_image().unwrap().data.iter().all(|&v| v == 30));
    }

    #[test]
    fn test_summary() {
        assert_eq!(SpeedSummary::from_speeds(vec![]), None);
        let summary = SpeedSummary::from_speeds(vec![30., 50., 40.]).unwrap();
        assert_eq!(
            summary,
            SpeedSummary {
                count: 3,
                mean: 40.,
                min: 30.,
                max: 50.
            }
        );
    }

    #[test]
    fn test_class_filter_and_missing_ids() {
        let mut pipeline = ratio_pipeline();
        let report = pipeline.process_frame(
            0,
            &[car(Some(1), 2, 100.), car(Some(2), 0, 400.), car(None, 2, 700.)],
        );
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0].track_id, TrackId(1));
        assert_eq!(report.objects[0].position, Vector2d::new(190., 650.));
        assert_eq!(pipeline.tracks().len(), 1);

        let mut config = Config::default();
        config.vehicle_classes.clear();
        let model = PixelRatioModel::new(config.reference_width).unwrap();
        let mut open = DetectionSpeedPipeline::new(model, &config).unwrap();
        let report = open.process_frame(0, &[car(Some(1), 2, 100.), car(Some(2), 0, 400.)]);
        assert_eq!(report.objects.len(), 2);

        let config = Config {
            all_classes: true,
            ..Default::default()
        };
        let model = PixelRatioModel::new(config.reference_width).unwrap();
        let mut open = DetectionSpeedPipeline::new(model, &config).unwrap();
        let report = open.process_frame(0, &[car(Some(1), 2, 100.), car(Some(2), 0, 400.)]);
        assert_eq!(report.objects.len(), 2);
    }

    #[test]
    fn test_ratio_speed() {
        // 180 px wide box of a 1.8 m car: 100 px/m; 10 px per frame is 3 m/s
        let mut pipeline = ratio_pipeline();
        let mut last = None;
        for frame in 0..20 {
            let report = pipeline.process_frame(frame, &[car(Some(7), 2, 100. + 10. * frame as f64)]);
            last = report.objects[0].speed_kmh;
            if frame < 14 {
                assert_eq!(last, None);
            }
        }
        assert_abs_diff_eq!(last.unwrap(), 10.8, epsilon = 1e-6);
        let summary = pipeline.summary().unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(pipeline.speed_estimates().get(&TrackId(7)), last.as_ref());
    }

    #[test]
    fn test_detection_tracks_time_out() {
        let mut pipeline = ratio_pipeline();
        pipeline.process_frame(0, &[car(Some(1), 2, 100.)]);
        pipeline.process_frame(30, &[]);
        assert!(pipeline.tracks().contains_key(&TrackId(1)));
        pipeline.process_frame(31, &[]);
        assert!(pipeline.tracks().is_empty());
    }

    #[test]
    fn test_ground_plane_uses_bottom_center() {
        let config = Config::default();
        let geometry = CameraGeometry {
            tilt_angle: 10.,
            ..CameraGeometry::from_config(&config.camera, 1920, 1080)
        };
        let model = GroundPlaneTransformer::calibrated(&geometry).unwrap();
        let mut pipeline = DetectionSpeedPipeline::new(model, &config).unwrap();
        let report = pipeline.process_frame(0, &[car(Some(1), 2, 100.)]);
        assert_eq!(report.objects[0].position, Vector2d::new(190., 700.));
        assert_eq!(pipeline.tracks()[&TrackId(1)].history.len(), 1);
    }

    #[test]
    fn test_invalid_fps() {
        let mut config = Config::default();
        config.fps = 0.;
        assert!(DepthSpeedPipeline::new(&config).is_err());
        assert!(DetectionSpeedPipeline::new(PixelRatioModel::new(1.8).unwrap(), &config).is_err());
    }
}
