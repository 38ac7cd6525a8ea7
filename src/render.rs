use std::path::Path;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fast_image_resize as fir;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::FrameError;

/// Decodes one base64 JPEG frame payload to RGBA8.
pub fn decode_frame(data: &str) -> Result<RgbaImage, FrameError> {
    let bytes = STANDARD.decode(data.trim())?;
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)?;
    Ok(img.to_rgba8())
}

/// The 2D pixel surface frames are painted onto, sized to the viewport.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
    frames_drawn: u64,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: blank(width, height),
            frames_drawn: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Clears the surface and paints `frame` stretched to the full surface.
    pub fn draw(&mut self, frame: &RgbaImage) -> Result<(), FrameError> {
        let scaled =
            resize_rgba(frame, self.width(), self.height()).map_err(FrameError::Resize)?;
        self.pixels = scaled;
        self.frames_drawn += 1;
        Ok(())
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.pixels
            .save(path)
            .with_context(|| format!("failed to write surface snapshot to {}", path.display()))
    }
}

fn blank(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == 0 || source.height() == 0 {
        anyhow::bail!("frame has no pixels");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for frame resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("frame resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow!("failed to construct resized RGBA image"))
}
