use anyhow::{bail, Result};

use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Wrap a row-major buffer, checking that its length matches the shape
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Result<Image> {
        if data.len() != width * height {
            bail!(
                "image buffer holds {} bytes, expected {width} x {height}",
                data.len()
            );
        }
        Ok(Image {
            data,
            width,
            height,
        })
    }

    /// Get the size for a chosen dimension
    pub fn size(&self, dim: usize) -> usize {
        if dim == 0 {
            self.width
        } else {
            self.height
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn value_i32(&self, x: i32, y: i32) -> u8 {
        self.data[y as usize * self.width + x as usize]
    }

    /// Whether a sub-pixel position lies inside the pixel centers of the image
    pub fn contains(&self, p: Vector2d) -> bool {
        !self.is_empty()
            && p.x >= 0.
            && p.y >= 0.
            && p.x <= (self.width - 1) as f64
            && p.y <= (self.height - 1) as f64
    }

    #[inline(always)]
    #[cfg(test)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy `patch` with its top-left corner at (x, y), clipping at the borders
    #[cfg(test)]
    pub fn set_sub_image_i32(&mut self, x: i32, y: i32, patch: &Image) {
        for py in 0..patch.height as i32 {
            for px in 0..patch.width as i32 {
                let (tx, ty) = (x + px, y + py);
                if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
                    continue;
                }
                self.set_value(tx as usize, ty as usize, patch.value_i32(px, py));
            }
        }
    }
}

/// Bilinear interpolation. Coordinates are clamped to the image so samples
/// just outside the last pixel center repeat the border.
pub fn bilinear(image: &Image, p: Vector2d) -> f64 {
    let max_x = (image.width - 1) as f64;
    let max_y = (image.height - 1) as f64;
    let x = p.x.clamp(0., max_x);
    let y = p.y.clamp(0., max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = usize::min(x0 + 1, image.width - 1);
    let y1 = usize::min(y0 + 1, image.height - 1);
    let ax = x - x0 as f64;
    let ay = y - y0 as f64;

    let v00 = image.value(x0, y0) as f64;
    let v10 = image.value(x1, y0) as f64;
    let v01 = image.value(x0, y1) as f64;
    let v11 = image.value(x1, y1) as f64;

    (1. - ay) * ((1. - ax) * v00 + ax * v10) + ay * ((1. - ax) * v01 + ax * v11)
}
