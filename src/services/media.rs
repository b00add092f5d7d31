use crate::core::{Result, StoreError};
use async_trait::async_trait;
use image::{GenericImageView, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Longest edge of a synthesized preview, in pixels.
pub const DEFAULT_PREVIEW_EDGE: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A downscaled preview of some binary image content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub file: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes just enough of an image to report its pixel size.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn measure(&self, bytes: &[u8]) -> Result<Dimensions>;
}

/// Produces a small preview image from full-size content.
#[async_trait]
pub trait PreviewSynthesizer: Send + Sync {
    async fn synthesize(&self, bytes: &[u8]) -> Result<Preview>;
}

/// Probe and synthesizer backed by the `image` crate. Decoding is CPU-bound, so it runs on
/// the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct RasterMedia {
    max_preview_edge: u32,
}

impl RasterMedia {
    pub fn new() -> Self {
        Self {
            max_preview_edge: DEFAULT_PREVIEW_EDGE,
        }
    }

    pub fn with_max_preview_edge(mut self, edge: u32) -> Self {
        self.max_preview_edge = edge.max(1);
        self
    }
}

impl Default for RasterMedia {
    fn default() -> Self {
        Self::new()
    }
}

// A step timeout drops the waiting future but not the blocking decode, which runs to
// completion on the blocking pool. The timeout frees the migration, not the thread.
#[async_trait]
impl ImageProbe for RasterMedia {
    async fn measure(&self, bytes: &[u8]) -> Result<Dimensions> {
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || probe_dimensions(&bytes))
            .await
            .map_err(|e| StoreError::Codec(format!("image probe task failed: {}", e)))?
    }
}

#[async_trait]
impl PreviewSynthesizer for RasterMedia {
    async fn synthesize(&self, bytes: &[u8]) -> Result<Preview> {
        let bytes = bytes.to_vec();
        let max_edge = self.max_preview_edge;
        tokio::task::spawn_blocking(move || render_preview(&bytes, max_edge))
            .await
            .map_err(|e| StoreError::Codec(format!("preview task failed: {}", e)))?
    }
}

/// Media collaborator that is never available; every call fails.
///
/// With it, the best-effort steps leave their derived fields empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMedia;

#[async_trait]
impl ImageProbe for NoMedia {
    async fn measure(&self, _bytes: &[u8]) -> Result<Dimensions> {
        Err(StoreError::Codec("image probing is unavailable".to_string()))
    }
}

#[async_trait]
impl PreviewSynthesizer for NoMedia {
    async fn synthesize(&self, _bytes: &[u8]) -> Result<Preview> {
        Err(StoreError::Codec("preview synthesis is unavailable".to_string()))
    }
}

fn probe_dimensions(bytes: &[u8]) -> Result<Dimensions> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| StoreError::Codec(format!("Failed to detect image format: {}", e)))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| StoreError::Codec(format!("Failed to read image dimensions: {}", e)))?;
    Ok(Dimensions { width, height })
}

fn render_preview(bytes: &[u8], max_edge: u32) -> Result<Preview> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| StoreError::Codec(format!("Failed to decode image: {}", e)))?;
    let (width, height) = decoded.dimensions();
    let preview = if width > max_edge || height > max_edge {
        decoded.thumbnail(max_edge, max_edge)
    } else {
        decoded
    };

    let mut file = Vec::new();
    preview
        .write_to(&mut Cursor::new(&mut file), ImageFormat::Png)
        .map_err(|e| StoreError::Codec(format!("Failed to encode preview: {}", e)))?;
    let (width, height) = preview.dimensions();
    Ok(Preview {
        file,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn measures_png_dimensions() {
        let dims = RasterMedia::new().measure(&png(120, 80)).await.unwrap();
        assert_eq!(dims, Dimensions { width: 120, height: 80 });
    }

    #[tokio::test]
    async fn previews_are_bounded() {
        let preview = RasterMedia::new()
            .with_max_preview_edge(50)
            .synthesize(&png(200, 100))
            .await
            .unwrap();
        assert_eq!((preview.width, preview.height), (50, 25));
        let dims = RasterMedia::new().measure(&preview.file).await.unwrap();
        assert_eq!(dims, Dimensions { width: 50, height: 25 });
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        assert!(RasterMedia::new().measure(b"not an image").await.is_err());
        assert!(RasterMedia::new().synthesize(b"not an image").await.is_err());
    }
}
