use anyhow::{Context, Result};

use crate::image::Image;
use crate::pyramid::Pyramid;

#[derive(Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    /// Build the pyramid for `image`. The level buffers of `unused_frame` are
    /// reused when given to avoid allocating on every frame.
    pub fn new(image: Image, levels: usize, unused_frame: Option<PyramidFrame>) -> Result<Self> {
        let mut pyramid = unused_frame
            .map(|frame| frame.pyramid)
            .unwrap_or_else(Pyramid::empty);
        pyramid
            .compute(&image, levels)
            .with_context(|| format!("building {levels} pyramid levels"))?;
        Ok(PyramidFrame { image, pyramid })
    }

    pub fn levels(&self) -> usize {
        self.pyramid.levels.len()
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }
}
