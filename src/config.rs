use clap::Parser;

/// Engine configuration. Every field has a command-line flag; `Default`
/// mirrors the flag defaults so library users can skip argument parsing.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Config {
    /// Video frame rate, used to turn frame indices into timestamps
    #[clap(long, default_value = "30")]
    pub fps: f64,

    /// The external depth map is refreshed every N frames
    #[clap(long, default_value = "3")]
    pub depth_refresh_interval: usize,

    #[clap(flatten)]
    pub feature_tracker: FeatureTrackerConfig,

    #[clap(flatten)]
    pub motion: MotionConfig,

    #[clap(flatten)]
    pub cluster: ClusterConfig,

    #[clap(flatten)]
    pub association: AssociationConfig,

    #[clap(flatten)]
    pub speed: SpeedConfig,

    #[clap(flatten)]
    pub depth: DepthConfig,

    #[clap(flatten)]
    pub camera: CameraConfig,

    /// Width of the reference object used by the pixel-ratio model, meters
    #[clap(long, default_value = "1.8")]
    pub reference_width: f64,

    /// Detector class labels treated as vehicles; empty admits everything
    #[clap(long, default_values = &["2", "3", "5", "7"])]
    pub vehicle_classes: Vec<u32>,

    /// Admit detections of every class, ignoring --vehicle-classes
    #[clap(long)]
    pub all_classes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: 30.,
            depth_refresh_interval: 3,
            feature_tracker: FeatureTrackerConfig::default(),
            motion: MotionConfig::default(),
            cluster: ClusterConfig::default(),
            association: AssociationConfig::default(),
            speed: SpeedConfig::default(),
            depth: DepthConfig::default(),
            camera: CameraConfig::default(),
            reference_width: 1.8,
            vehicle_classes: vec![2, 3, 5, 7],
            all_classes: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct FeatureTrackerConfig {
    #[clap(long, default_value = "200")]
    pub max_corners: usize,
    /// Corners weaker than this fraction of the strongest are dropped
    #[clap(long, default_value = "0.01")]
    pub quality_level: f64,
    #[clap(long, default_value = "20")]
    pub min_corner_distance: f64,
    #[clap(long, default_value = "7")]
    pub block_size: usize,
    /// Lucas-Kanade search window side, pixels
    #[clap(long, default_value = "21")]
    pub lk_win_size: usize,
    #[clap(long, default_value = "3")]
    pub lk_levels: usize,
    #[clap(long, default_value = "10")]
    pub lk_iters: usize,
    #[clap(long, default_value = "0.03")]
    pub lk_epsilon: f64,
    /// Compensated displacement a feature needs to count as moving
    #[clap(long, default_value = "2.5")]
    pub motion_threshold: f64,
}

impl Default for FeatureTrackerConfig {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_corner_distance: 20.,
            block_size: 7,
            lk_win_size: 21,
            lk_levels: 3,
            lk_iters: 10,
            lk_epsilon: 0.03,
            motion_threshold: 2.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct MotionConfig {
    /// Disable camera-motion compensation
    #[clap(long = "no-motion-compensation")]
    pub disabled: bool,
    /// Border band width as a fraction of the shorter frame side
    #[clap(long, default_value = "0.15")]
    pub border_fraction: f64,
    #[clap(long, default_value = "100")]
    pub border_max_corners: usize,
    #[clap(long, default_value = "30")]
    pub border_min_distance: f64,
    #[clap(long, default_value = "10")]
    pub min_border_points: usize,
    /// Camera motion below this many pixels is ignored
    #[clap(long, default_value = "2.0")]
    pub min_camera_motion: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            border_fraction: 0.15,
            border_max_corners: 100,
            border_min_distance: 30.,
            min_border_points: 10,
            min_camera_motion: 2.,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct ClusterConfig {
    #[clap(long, default_value = "2.0")]
    pub cluster_min_magnitude: f64,
    /// Fewer moving points than this and no clustering is attempted
    #[clap(long, default_value = "3")]
    pub cluster_min_valid_points: usize,
    #[clap(long, default_value = "80")]
    pub cluster_radius: f64,
    #[clap(long, default_value = "5")]
    pub cluster_min_points: usize,
    #[clap(long, default_value = "40")]
    pub min_box_width: f64,
    #[clap(long, default_value = "300")]
    pub max_box_width: f64,
    #[clap(long, default_value = "30")]
    pub min_box_height: f64,
    #[clap(long, default_value = "200")]
    pub max_box_height: f64,
    #[clap(long, default_value = "1200")]
    pub min_box_area: f64,
    #[clap(long, default_value = "60000")]
    pub max_box_area: f64,
    #[clap(long, default_value = "0.8")]
    pub min_aspect_ratio: f64,
    #[clap(long, default_value = "4.0")]
    pub max_aspect_ratio: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_min_magnitude: 2.,
            cluster_min_valid_points: 3,
            cluster_radius: 80.,
            cluster_min_points: 5,
            min_box_width: 40.,
            max_box_width: 300.,
            min_box_height: 30.,
            max_box_height: 200.,
            min_box_area: 1200.,
            max_box_area: 60000.,
            min_aspect_ratio: 0.8,
            max_aspect_ratio: 4.,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct AssociationConfig {
    #[clap(long, default_value = "150")]
    pub max_match_distance: f64,
    /// Frames without a match before a track is evicted
    #[clap(long, default_value = "30")]
    pub track_timeout: usize,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 150.,
            track_timeout: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct SpeedConfig {
    #[clap(long, default_value = "30")]
    pub history_size: usize,
    #[clap(long, default_value = "15")]
    pub min_samples: usize,
    #[clap(long, default_value = "20")]
    pub window_size: usize,
    /// Larger jumps between consecutive estimates are averaged, km/h
    #[clap(long, default_value = "30")]
    pub max_speed_jump: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            history_size: 30,
            min_samples: 15,
            window_size: 20,
            max_speed_jump: 30.,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct DepthConfig {
    /// Known distance of a reference point, meters
    #[clap(long)]
    pub reference_distance: Option<f64>,
    /// Normalized depth measured at the reference point
    #[clap(long)]
    pub reference_depth: Option<f64>,
    #[clap(long, default_value = "10")]
    pub min_distance: f64,
    #[clap(long, default_value = "80")]
    pub max_distance: f64,
    /// Focal length in pixels; estimated when absent
    #[clap(long)]
    pub focal_length_px: Option<f64>,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            reference_distance: None,
            reference_depth: None,
            min_distance: 10.,
            max_distance: 80.,
            focal_length_px: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct CameraConfig {
    /// Camera height above the road, meters
    #[clap(long, default_value = "1.4")]
    pub camera_height: f64,
    /// Degrees, positive looks down
    #[clap(long, default_value = "-14", allow_hyphen_values = true)]
    pub tilt_angle: f64,
    /// Degrees, positive looks right
    #[clap(long, default_value = "0", allow_hyphen_values = true)]
    pub pan_angle: f64,
    /// Focal length, millimeters
    #[clap(long, default_value = "26")]
    pub focal_length: f64,
    /// Sensor width, millimeters
    #[clap(long, default_value = "36")]
    pub sensor_width: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_height: 1.4,
            tilt_angle: -14.,
            pan_angle: 0.,
            focal_length: 26.,
            sensor_width: 36.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_defaults_match_default() {
        let parsed = Config::parse_from(["monospeed"]);
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_overrides() {
        let parsed = Config::parse_from([
            "monospeed",
            "--fps",
            "25",
            "--tilt-angle",
            "-10",
            "--reference-distance",
            "20",
            "--reference-depth",
            "0.7",
            "--no-motion-compensation",
        ]);
        assert_eq!(parsed.fps, 25.);
        assert_eq!(parsed.camera.tilt_angle, -10.);
        assert_eq!(parsed.depth.reference_distance, Some(20.));
        assert_eq!(parsed.depth.reference_depth, Some(0.7));
        assert!(parsed.motion.disabled);
        assert!(!parsed.all_classes);

        let parsed = Config::parse_from(["monospeed", "--all-classes"]);
        assert!(parsed.all_classes);
        assert_eq!(parsed.vehicle_classes, vec![2, 3, 5, 7]);
    }
}
