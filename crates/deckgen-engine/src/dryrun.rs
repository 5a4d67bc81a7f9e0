use anyhow::{Context, Result};
use deckgen_contracts::resolution::{resolve, PixelDimensions};
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{ImageGenerationRequest, ImageProvider};

/// Offline image provider: a solid colour derived from the prompt, sized by
/// the ratio-computed resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunImageProvider {
    /// Divides both edges, so tests can keep images small.
    scale_down: u32,
}

impl DryrunImageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale_down(mut self, factor: u32) -> Self {
        self.scale_down = factor;
        self
    }

    fn dimensions(&self, request: &ImageGenerationRequest) -> Result<PixelDimensions> {
        let dims = resolve(&request.aspect_ratio, &request.resolution)
            .context("dryrun image size")?;
        let factor = self.scale_down.max(1);
        Ok(PixelDimensions {
            width: (dims.width / factor).max(1),
            height: (dims.height / factor).max(1),
        })
    }
}

impl ImageProvider for DryrunImageProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_image(&self, request: &ImageGenerationRequest) -> Result<Option<DynamicImage>> {
        let dims = self.dimensions(request)?;
        let (r, g, b) = color_from_prompt(&request.prompt, request.reference_images.len() as u64);
        debug!(width = dims.width, height = dims.height, "dryrun image");
        let image = RgbImage::from_pixel(dims.width, dims.height, Rgb([r, g, b]));
        Ok(Some(DynamicImage::ImageRgb8(image)))
    }
}

pub fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, aspect_ratio: &str, resolution: &str) -> ImageGenerationRequest {
        ImageGenerationRequest {
            prompt: prompt.to_string(),
            reference_images: Vec::new(),
            aspect_ratio: aspect_ratio.to_string(),
            resolution: resolution.to_string(),
        }
    }

    #[test]
    fn dryrun_sizes_by_ratio_resolver() -> Result<()> {
        let image = DryrunImageProvider::new()
            .generate_image(&request("slide", "16:9", "2K"))?
            .map(|image| (image.width(), image.height()));
        assert_eq!(image, Some((2560, 1472)));

        let small = DryrunImageProvider::new()
            .with_scale_down(64)
            .generate_image(&request("slide", "9:16", "1K"))?
            .map(|image| (image.width(), image.height()));
        assert_eq!(small, Some((23, 40)));
        Ok(())
    }

    #[test]
    fn colour_is_stable_per_prompt() {
        assert_eq!(color_from_prompt("a", 0), color_from_prompt("a", 0));
        assert_ne!(color_from_prompt("a", 0), color_from_prompt("b", 0));
    }

    #[test]
    fn degenerate_ratio_is_an_error() {
        let err = DryrunImageProvider::new()
            .generate_image(&request("slide", "0:9", "2K"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "dryrun image size");
    }
}
