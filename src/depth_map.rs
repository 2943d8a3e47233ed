use anyhow::{bail, Result};
use log::debug;
use ndarray as nd;

use crate::image::Image;
use crate::my_types::*;

/// Dense per-pixel depth normalized to [0, 1], 1 being nearest. Indexed as
/// `values[(row, column)]` at frame resolution.
#[derive(Clone, Debug)]
pub struct DepthMap {
    pub values: nd::Array2<f32>,
}

impl DepthMap {
    pub fn new(values: nd::Array2<f32>) -> Result<Self> {
        if values.is_empty() {
            bail!("depth map is empty");
        }
        Ok(DepthMap { values })
    }

    /// Min-max normalize raw model output into [0, 1]
    pub fn from_raw(raw: nd::Array2<f32>) -> Result<Self> {
        if raw.is_empty() {
            bail!("depth map is empty");
        }
        let min = raw.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = raw.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let values = raw.mapv(|v| (v - min) / (max - min + 1e-8));
        Ok(DepthMap { values })
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Depth at the pixel containing `p`, clamped to the map
    pub fn sample(&self, p: Vector2d) -> f64 {
        let x = (p.x.max(0.) as usize).min(self.width() - 1);
        let y = (p.y.max(0.) as usize).min(self.height() - 1);
        self.values[(y, x)] as f64
    }
}

/// External monocular depth model
pub trait DepthEstimator {
    fn estimate(&mut self, frame: &Image) -> Result<DepthMap>;
}

/// Reuses one depth map for several frames, refreshing it every
/// `refresh_interval` frames and whenever none is cached yet.
pub struct DepthCache {
    refresh_interval: usize,
    latest: Option<DepthMap>,
}

impl DepthCache {
    pub fn new(refresh_interval: usize) -> Self {
        Self {
            refresh_interval: refresh_interval.max(1),
            latest: None,
        }
    }

    pub fn get(
        &mut self,
        frame_index: usize,
        frame: &Image,
        estimator: &mut dyn DepthEstimator,
    ) -> Result<&DepthMap> {
        let stale = frame_index % self.refresh_interval == 0;
        let depth = match self.latest.take() {
            Some(cached) if !stale => cached,
            _ => {
                debug!("refreshing depth map at frame {frame_index}");
                estimator.estimate(frame)?
            }
        };
        Ok(self.latest.insert(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEstimator {
        calls: usize,
    }

    impl DepthEstimator for CountingEstimator {
        fn estimate(&mut self, _frame: &Image) -> Result<DepthMap> {
            self.calls += 1;
            DepthMap::new(nd::Array2::from_elem((2, 2), self.calls as f32))
        }
    }

    #[test]
    fn test_sample_is_clamped() {
        let depth = DepthMap::new(nd::array![[0.1, 0.2], [0.3, 0.4]]).unwrap();
        assert_eq!(depth.sample(Vector2d::new(1.7, 0.2)) as f32, 0.2);
        assert_eq!(depth.sample(Vector2d::new(-5., 9.)) as f32, 0.3);
        assert_eq!(depth.sample(Vector2d::new(50., 50.)) as f32, 0.4);
    }

    #[test]
    fn test_from_raw_normalizes() {
        let depth = DepthMap::from_raw(nd::array![[2., 4.], [6., 10.]]).unwrap();
        assert!(depth.values[(0, 0)].abs() < 1e-6);
        assert!((depth.values[(1, 1)] - 1.).abs() < 1e-6);
        assert!((depth.values[(0, 1)] - 0.25).abs() < 1e-6);
        assert!(DepthMap::from_raw(nd::Array2::zeros((0, 3))).is_err());
    }

    #[test]
    fn test_cache_refresh_interval() {
        let frame = Image::new(vec![0; 4], 2, 2).unwrap();
        let mut estimator = CountingEstimator { calls: 0 };
        let mut cache = DepthCache::new(3);
        // starting mid-stream still estimates on the first call
        for frame_index in 1..=7 {
            cache.get(frame_index, &frame, &mut estimator).unwrap();
        }
        // frame 1 (empty cache), 3 and 6
        assert_eq!(estimator.calls, 3);
    }
}
