//! Optional resize and recompression of validated images.
//!
//! Runs on the blocking pool right after validation. JPEG, PNG, BMP and TIFF
//! are decoded, scaled down to fit the configured box and re-encoded in
//! their own format, which drops EXIF and other metadata. GIF (animation),
//! WebP and SVG pass through untouched.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use mdimg_core::{MigrationError, MigrationSettings, OptimizeSettings, ValidationFailure};

use crate::validate::ImageKind;

/// Result of one optimisation pass.
///
/// `width` and `height` are 0 for kinds that were passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// True if the image was scaled down.
    pub resized: bool,
}

/// Resizes and recompresses raster images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptimizer {
    max_width: u32,
    max_height: u32,
    quality: u8,
}

impl ImageOptimizer {
    #[must_use]
    pub const fn new(settings: OptimizeSettings) -> Self {
        Self {
            max_width: settings.max_width,
            max_height: settings.max_height,
            quality: settings.quality,
        }
    }

    /// Optimizer described by `settings`, if optimisation is enabled.
    #[must_use]
    pub fn from_settings(settings: &MigrationSettings) -> Option<Self> {
        settings.optimize.map(Self::new)
    }

    /// Whether images of `kind` are re-encoded at all.
    #[must_use]
    pub const fn applies_to(kind: ImageKind) -> bool {
        Self::format_for(kind).is_some()
    }

    const fn format_for(kind: ImageKind) -> Option<ImageFormat> {
        match kind {
            ImageKind::Jpeg => Some(ImageFormat::Jpeg),
            ImageKind::Png => Some(ImageFormat::Png),
            ImageKind::Bmp => Some(ImageFormat::Bmp),
            ImageKind::Tiff => Some(ImageFormat::Tiff),
            ImageKind::Gif | ImageKind::Webp | ImageKind::Svg => None,
        }
    }

    /// Re-encode `bytes`, an image of `kind`, scaled to fit the box.
    ///
    /// Kinds that are not handled come back unchanged.
    pub fn optimize(&self, bytes: Vec<u8>, kind: ImageKind) -> Result<Optimized, MigrationError> {
        let Some(format) = Self::format_for(kind) else {
            return Ok(Optimized {
                width: 0,
                height: 0,
                resized: false,
                bytes,
            });
        };

        let decoded = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
            MigrationError::validation(
                ValidationFailure::Corrupt,
                format!("cannot decode for optimisation: {e}"),
            )
        })?;
        let resized = decoded.width() > self.max_width || decoded.height() > self.max_height;
        let image = if resized {
            decoded.resize(self.max_width, self.max_height, FilterType::Lanczos3)
        } else {
            decoded
        };

        let mut out = Cursor::new(Vec::with_capacity(bytes.len()));
        let encoded = if kind == ImageKind::Jpeg {
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))
        } else {
            image.write_to(&mut out, format)
        };
        encoded.map_err(|e| {
            MigrationError::validation(
                ValidationFailure::Corrupt,
                format!("re-encoding failed: {e}"),
            )
        })?;

        let out = out.into_inner();
        tracing::debug!(
            target: "mdimg.download",
            kind = kind.mime_type(),
            width = image.width(),
            height = image.height(),
            resized,
            before = bytes.len(),
            after = out.len(),
            "Optimized image"
        );

        Ok(Optimized {
            bytes: out,
            width: image.width(),
            height: image.height(),
            resized,
        })
    }
}
