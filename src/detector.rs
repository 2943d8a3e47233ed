use ndarray as nd;

use crate::image::Image;
use crate::my_types::*;

/// Minimum-eigenvalue ("good features to track") corner detector.
/// ref Shi and Tomasi, Good Features to Track, CVPR 1994
pub struct Detector {
    pub max_corners: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: usize,
    response: nd::Array2<f32>,
}

impl Detector {
    pub fn new(max_corners: usize, quality_level: f64, min_distance: f64, block_size: usize) -> Self {
        Detector {
            max_corners,
            quality_level,
            min_distance,
            block_size: block_size.max(1),
            response: nd::Array2::zeros((0, 0)),
        }
    }

    /// Detect up to `max_corners` corners, strongest first. Pixels whose
    /// `mask` entry is false are never returned.
    pub fn detect(&mut self, image: &Image, mask: Option<&[bool]>) -> Vec<Vector2d> {
        if image.width < 3 || image.height < 3 || self.max_corners == 0 {
            return vec![];
        }
        if let Some(mask) = mask {
            debug_assert_eq!(mask.len(), image.width * image.height);
        }

        self.compute_response(image);
        let response = &self.response;
        let max_response = response.iter().cloned().fold(0f32, f32::max);
        if max_response <= 0. {
            return vec![];
        }
        let threshold = (max_response as f64 * self.quality_level) as f32;

        // local maxima over a 3x3 neighbourhood above the quality threshold
        let (h, w) = response.dim();
        let mut candidates = vec![];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let r = response[(y, x)];
                if r <= threshold {
                    continue;
                }
                if mask.map_or(false, |m| !m[y * w + x]) {
                    continue;
                }
                let is_peak = (y - 1..=y + 1)
                    .all(|ny| (x - 1..=x + 1).all(|nx| response[(ny, nx)] <= r));
                if is_peak {
                    candidates.push((r, x, y));
                }
            }
        }
        // strongest first, stable on raster order
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        self.select_spread(candidates, w, h)
    }

    /// Greedy selection enforcing `min_distance` between accepted corners,
    /// bucketed on a grid of cell size `min_distance`.
    fn select_spread(&self, candidates: Vec<(f32, usize, usize)>, w: usize, h: usize) -> Vec<Vector2d> {
        let min_dist2 = self.min_distance * self.min_distance;
        let cell = self.min_distance.max(1.);
        let grid_w = (w as f64 / cell).ceil() as usize + 1;
        let grid_h = (h as f64 / cell).ceil() as usize + 1;
        let mut grid: Vec<Vec<Vector2d>> = vec![vec![]; grid_w * grid_h];

        let mut corners = vec![];
        for (_, x, y) in candidates {
            let p = Vector2d::new(x as f64, y as f64);
            let cx = (p.x / cell) as usize;
            let cy = (p.y / cell) as usize;

            let mut too_close = false;
            'search: for gy in cy.saturating_sub(1)..=usize::min(cy + 1, grid_h - 1) {
                for gx in cx.saturating_sub(1)..=usize::min(cx + 1, grid_w - 1) {
                    if grid[gy * grid_w + gx]
                        .iter()
                        .any(|q| (q - p).norm_squared() < min_dist2)
                    {
                        too_close = true;
                        break 'search;
                    }
                }
            }
            if too_close {
                continue;
            }

            grid[cy * grid_w + cx].push(p);
            corners.push(p);
            if corners.len() >= self.max_corners {
                break;
            }
        }
        corners
    }

    /// Smallest eigenvalue of the gradient structure tensor summed over a
    /// `block_size` box around every pixel.
    fn compute_response(&mut self, image: &Image) {
        let (w, h) = (image.width, image.height);

        // Sobel derivatives, zero on the one pixel border
        let mut dxx = nd::Array2::<f64>::zeros((h, w));
        let mut dyy = nd::Array2::<f64>::zeros((h, w));
        let mut dxy = nd::Array2::<f64>::zeros((h, w));
        let v = |x: usize, y: usize| image.value(x, y) as f64;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let gx = (v(x + 1, y - 1) + 2. * v(x + 1, y) + v(x + 1, y + 1)
                    - v(x - 1, y - 1)
                    - 2. * v(x - 1, y)
                    - v(x - 1, y + 1))
                    / 8.;
                let gy = (v(x - 1, y + 1) + 2. * v(x, y + 1) + v(x + 1, y + 1)
                    - v(x - 1, y - 1)
                    - 2. * v(x, y - 1)
                    - v(x + 1, y - 1))
                    / 8.;
                dxx[(y, x)] = gx * gx;
                dyy[(y, x)] = gy * gy;
                dxy[(y, x)] = gx * gy;
            }
        }

        let sxx = integral(&dxx);
        let syy = integral(&dyy);
        let sxy = integral(&dxy);

        let r = (self.block_size / 2) as isize;
        self.response = nd::Array2::zeros((h, w));
        for y in 0..h {
            let y0 = (y as isize - r).max(0) as usize;
            let y1 = usize::min(y + r as usize + 1, h);
            for x in 0..w {
                let x0 = (x as isize - r).max(0) as usize;
                let x1 = usize::min(x + r as usize + 1, w);
                let a = box_sum(&sxx, x0, y0, x1, y1);
                let c = box_sum(&syy, x0, y0, x1, y1);
                let b = box_sum(&sxy, x0, y0, x1, y1);
                let half_trace = (a + c) / 2.;
                let root = (((a - c) / 2.).powi(2) + b * b).sqrt();
                self.response[(y, x)] = (half_trace - root).max(0.) as f32;
            }
        }
    }
}

/// Summed-area table with a leading zero row and column
fn integral(values: &nd::Array2<f64>) -> nd::Array2<f64> {
    let (h, w) = values.dim();
    let mut table = nd::Array2::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row_sum = 0.;
        for x in 0..w {
            row_sum += values[(y, x)];
            table[(y + 1, x + 1)] = table[(y, x + 1)] + row_sum;
        }
    }
    table
}

/// Sum over the half-open pixel range [x0, x1) x [y0, y1)
fn box_sum(table: &nd::Array2<f64>, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
    table[(y1, x1)] - table[(y0, x1)] - table[(y1, x0)] + table[(y0, x0)]
}
