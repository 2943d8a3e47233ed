use crate::my_types::*;

/// One corner followed from the previous frame into the current one.
/// Lives for a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeaturePoint {
    pub old_position: Vector2d,
    pub new_position: Vector2d,
    /// displacement with the camera motion removed
    pub displacement: Vector2d,
    pub magnitude: f64,
}

impl FeaturePoint {
    pub fn new(old_position: Vector2d, new_position: Vector2d, camera_motion: Option<Vector2d>) -> Self {
        let displacement = new_position - old_position - camera_motion.unwrap_or_else(Vector2d::zeros);
        FeaturePoint {
            old_position,
            new_position,
            displacement,
            magnitude: displacement.norm(),
        }
    }
}
