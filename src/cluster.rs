use log::debug;

use crate::config::ClusterConfig;
use crate::depth_map::DepthMap;
use crate::feature::FeaturePoint;
use crate::math::mean;
use crate::my_types::*;

/// A group of moving features that plausibly belongs to one vehicle.
/// Lives for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectCandidate {
    pub center: Vector2d,
    pub bounding_box: BoundingBox,
    pub depth: Option<f64>,
    pub avg_displacement: Vector2d,
    pub feature_count: usize,
}

/// Greedy proximity clustering of moving features.
///
/// Points are visited in input order. Each unused point seeds a cluster of
/// every still-unused point within `cluster_radius` of it (itself included).
/// Accepted clusters consume their points; sparse clusters leave them
/// available to later seeds. Clusters whose box fails the vehicle size,
/// area or aspect limits are dropped after their points are consumed.
pub struct ObjectClusterer {
    config: ClusterConfig,
}

impl ObjectClusterer {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn cluster(&self, features: &[FeaturePoint], depth_map: Option<&DepthMap>) -> Vec<ObjectCandidate> {
        let config = &self.config;
        let moving: Vec<&FeaturePoint> = features
            .iter()
            .filter(|f| f.magnitude > config.cluster_min_magnitude)
            .collect();
        if moving.len() < config.cluster_min_valid_points {
            return vec![];
        }

        let radius2 = config.cluster_radius.powi(2);
        let mut used = vec![false; moving.len()];
        let mut objects = vec![];

        for (i, seed) in moving.iter().enumerate() {
            if used[i] {
                continue;
            }

            let members: Vec<usize> = (0..moving.len())
                .filter(|&j| {
                    !used[j] && (moving[j].new_position - seed.new_position).norm_squared() < radius2
                })
                .collect();
            if members.len() < config.cluster_min_points {
                continue;
            }
            for &j in &members {
                used[j] = true;
            }

            if let Some(object) = self.describe(&moving, &members, depth_map) {
                objects.push(object);
            }
        }

        objects
    }

    fn describe(
        &self,
        moving: &[&FeaturePoint],
        members: &[usize],
        depth_map: Option<&DepthMap>,
    ) -> Option<ObjectCandidate> {
        let positions = || members.iter().map(|&j| moving[j].new_position);
        let center = mean(positions())?;
        let avg_displacement = mean(members.iter().map(|&j| moving[j].displacement))?;

        let mut min = Vector2d::repeat(f64::INFINITY);
        let mut max = Vector2d::repeat(f64::NEG_INFINITY);
        for p in positions() {
            min = min.inf(&p);
            max = max.sup(&p);
        }
        let bounding_box = BoundingBox { min, max };

        if !self.is_vehicle_sized(&bounding_box) {
            debug!(
                "rejecting cluster of {} at ({:.0}, {:.0}), box {:.0}x{:.0}",
                members.len(),
                center.x,
                center.y,
                bounding_box.width(),
                bounding_box.height()
            );
            return None;
        }

        Some(ObjectCandidate {
            center,
            bounding_box,
            depth: depth_map.map(|d| d.sample(center)),
            avg_displacement,
            feature_count: members.len(),
        })
    }

    fn is_vehicle_sized(&self, bbox: &BoundingBox) -> bool {
        let config = &self.config;
        let width = bbox.width();
        let height = bbox.height();
        let area = bbox.area();
        let aspect_ratio = width / (height + 1e-6);

        (config.min_box_width..=config.max_box_width).contains(&width)
            && (config.min_box_height..=config.max_box_height).contains(&height)
            && (config.min_box_area..=config.max_box_area).contains(&area)
            && (config.min_aspect_ratio..=config.max_aspect_ratio).contains(&aspect_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray as nd;

    fn moving_point(x: f64, y: f64) -> FeaturePoint {
        FeaturePoint::new(Vector2d::new(x - 4., y), Vector2d::new(x, y), None)
    }

    /// 3x3 lattice of moving points spanning `w` by `h` from (x, y)
    fn blob(x: f64, y: f64, w: f64, h: f64) -> Vec<FeaturePoint> {
        let mut points = vec![];
        for i in 0..3 {
            for j in 0..3 {
                points.push(moving_point(x + w * i as f64 / 2., y + h * j as f64 / 2.));
            }
        }
        points
    }

    #[test]
    fn test_single_vehicle() {
        let depth = DepthMap::new(nd::Array2::from_elem((480, 640), 0.6)).unwrap();
        let clusterer = ObjectClusterer::new(&ClusterConfig::default());
        let objects = clusterer.cluster(&blob(100., 200., 60., 40.), Some(&depth));

        assert_eq!(objects.len(), 1);
        let object = &objects[0];
        assert_eq!(object.feature_count, 9);
        assert_eq!(object.center, Vector2d::new(130., 220.));
        assert_eq!(object.bounding_box, BoundingBox::new(100., 200., 160., 240.));
        assert_eq!(object.avg_displacement, Vector2d::new(4., 0.));
        assert!((object.depth.unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_slow_points_are_ignored() {
        let mut points = blob(100., 200., 80., 50.);
        for p in points.iter_mut() {
            *p = FeaturePoint::new(p.new_position - Vector2d::new(1.5, 0.), p.new_position, None);
        }
        let clusterer = ObjectClusterer::new(&ClusterConfig::default());
        assert!(clusterer.cluster(&points, None).is_empty());
    }

    #[test]
    fn test_sparse_cluster_is_dropped() {
        let points: Vec<_> = blob(100., 200., 80., 50.).into_iter().take(4).collect();
        let clusterer = ObjectClusterer::new(&ClusterConfig::default());
        assert!(clusterer.cluster(&points, None).is_empty());
    }

    #[test]
    fn test_implausible_boxes_are_dropped() {
        let clusterer = ObjectClusterer::new(&ClusterConfig::default());
        // too narrow
        assert!(clusterer.cluster(&blob(100., 100., 20., 40.), None).is_empty());
        // too tall for its width
        assert!(clusterer.cluster(&blob(100., 100., 40., 60.), None).is_empty());
        // plausible
        assert_eq!(clusterer.cluster(&blob(100., 100., 60., 40.), None).len(), 1);
    }

    #[test]
    fn test_two_separate_vehicles() {
        let mut points = blob(100., 100., 60., 40.);
        points.extend(blob(400., 300., 70., 35.));
        let clusterer = ObjectClusterer::new(&ClusterConfig::default());
        let objects = clusterer.cluster(&points, None);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].center, Vector2d::new(130., 120.));
        assert_eq!(objects[1].center, Vector2d::new(435., 317.5));
        assert!(objects.iter().all(|o| o.depth.is_none()));
    }

    #[test]
    fn test_consumption_is_order_dependent() {
        // seed at the left end only reaches the first five points; the rest
        // form a second cluster from their own seed
        let xs = [0., 20., 40., 60., 70., 100., 120., 130., 140., 150.];
        let points: Vec<_> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| moving_point(100. + x, 100. + if i % 2 == 0 { 0. } else { 40. }))
            .collect();
        let mut config = ClusterConfig::default();
        config.min_box_width = 0.;
        config.min_box_area = 0.;
        config.min_aspect_ratio = 0.;
        let clusterer = ObjectClusterer::new(&config);

        let forward = clusterer.cluster(&points, None);
        let reversed: Vec<_> = points.iter().rev().cloned().collect();
        let backward = clusterer.cluster(&reversed, None);
        assert_eq!(forward.iter().map(|o| o.feature_count).sum::<usize>(), 10);
        assert_ne!(forward[0].center, backward[0].center);
    }
}
