//! Content validation.
//!
//! Decides whether fetched bytes are an image worth migrating, and what kind.
//!
//! # Design
//!
//! - Declared headers are checked before the body is read ([`ContentValidator::check_declared`])
//! - The real kind comes from the bytes, never from the URL or file name
//! - Raster images are fully decoded; every GIF frame is decoded
//! - SVGs are checked structurally and screened for tracking placeholders
//!
//! Validation is CPU-bound and synchronous; async callers should run it on a
//! blocking thread.

mod svg;

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat};
use mdimg_core::{MigrationError, MigrationSettings, ValidationFailure};
use thiserror::Error;

use svg::SvgCheck;

/// Generic MIME types whose real kind is determined by sniffing the content.
const SNIFF_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/xml",
    "text/xml",
];

/// The image formats the pipeline can migrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Svg,
}

impl ImageKind {
    /// Canonical MIME type, used as the stored object's content type.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Svg => "image/svg+xml",
        }
    }

    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Svg => "svg",
        }
    }

    const fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    const fn format(self) -> Option<ImageFormat> {
        match self {
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Webp => Some(ImageFormat::WebP),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Tiff => Some(ImageFormat::Tiff),
            Self::Svg => None,
        }
    }
}

/// Content was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub failure: ValidationFailure,
    pub message: String,
}

impl ValidationError {
    fn new(failure: ValidationFailure, message: impl Into<String>) -> Self {
        Self {
            failure,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for MigrationError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err.failure, err.message)
    }
}

/// Lowercased MIME type without parameters (`image/PNG; q=1` -> `image/png`).
fn normalize_mime(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/svg" => "image/svg+xml".to_string(),
        _ => essence,
    }
}

/// Validates image payloads against an allow-list and a size limit.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    allowed: Vec<String>,
    max_file_size: u64,
}

impl ContentValidator {
    /// Create a validator. MIME types are normalised on construction.
    pub fn new<I, S>(allowed_mime_types: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed_mime_types
                .into_iter()
                .map(|m| normalize_mime(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
            max_file_size,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &MigrationSettings) -> Self {
        Self::new(&settings.allowed_mime_types, settings.max_file_size_bytes)
    }

    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn is_allowed(&self, mime: &str) -> bool {
        self.allowed.iter().any(|a| a == mime)
    }

    fn is_sniff_type(mime: &str) -> bool {
        SNIFF_TYPES.contains(&mime)
    }

    /// Check response headers before any body bytes are read.
    ///
    /// A missing `Content-Type` is accepted and resolved by sniffing later.
    pub fn check_declared(
        &self,
        content_type: Option<&str>,
        content_length: Option<u64>,
    ) -> Result<(), ValidationError> {
        if let Some(declared) = content_type.map(normalize_mime).filter(|m| !m.is_empty()) {
            if !self.is_allowed(&declared) && !Self::is_sniff_type(&declared) {
                return Err(ValidationError::new(
                    ValidationFailure::UnsupportedType,
                    format!("unsupported content type '{declared}'"),
                ));
            }
        }
        if let Some(length) = content_length {
            if length > self.max_file_size {
                return Err(ValidationError::new(
                    ValidationFailure::Oversized,
                    format!(
                        "declared size {length} bytes exceeds limit of {} bytes",
                        self.max_file_size
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Validate a complete payload and return its kind.
    pub fn validate(
        &self,
        bytes: &[u8],
        declared_content_type: Option<&str>,
    ) -> Result<ImageKind, ValidationError> {
        if bytes.len() as u64 > self.max_file_size {
            return Err(ValidationError::new(
                ValidationFailure::Oversized,
                format!(
                    "{} bytes exceeds limit of {} bytes",
                    bytes.len(),
                    self.max_file_size
                ),
            ));
        }
        if bytes.is_empty() {
            return Err(ValidationError::new(
                ValidationFailure::Corrupt,
                "empty response body",
            ));
        }

        let declared = declared_content_type.map(normalize_mime);
        let declared_svg = declared.as_deref().is_some_and(|m| {
            m == "image/svg+xml" || m == "application/xml" || m == "text/xml"
        });

        let kind = if declared_svg || svg::looks_like_svg(bytes) {
            ImageKind::Svg
        } else {
            let format = image::guess_format(bytes).map_err(|_| {
                let declared_image = declared
                    .as_deref()
                    .is_some_and(|m| m.starts_with("image/"));
                if declared_image {
                    ValidationError::new(
                        ValidationFailure::Corrupt,
                        "content does not match any known image signature",
                    )
                } else {
                    ValidationError::new(
                        ValidationFailure::UnsupportedType,
                        "content is not a recognised image",
                    )
                }
            })?;
            ImageKind::from_format(format).ok_or_else(|| {
                ValidationError::new(
                    ValidationFailure::UnsupportedType,
                    format!("unsupported image format {format:?}"),
                )
            })?
        };

        if !self.is_allowed(kind.mime_type()) {
            return Err(ValidationError::new(
                ValidationFailure::UnsupportedType,
                format!("{} is not an allowed type", kind.mime_type()),
            ));
        }

        match kind.format() {
            None => check_svg(bytes)?,
            Some(ImageFormat::Gif) => check_gif(bytes)?,
            Some(format) => check_raster(bytes, format)?,
        }
        Ok(kind)
    }
}

fn check_svg(bytes: &[u8]) -> Result<(), ValidationError> {
    match svg::inspect(bytes) {
        SvgCheck::Valid => Ok(()),
        SvgCheck::Placeholder => Err(ValidationError::new(
            ValidationFailure::Placeholder,
            "SVG is a 1x1 or transparent placeholder",
        )),
        SvgCheck::Malformed => Err(ValidationError::new(
            ValidationFailure::Corrupt,
            "SVG is missing its <svg> element",
        )),
    }
}

fn check_raster(bytes: &[u8], format: ImageFormat) -> Result<(), ValidationError> {
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        ValidationError::new(
            ValidationFailure::Corrupt,
            format!("failed to decode {format:?}: {e}"),
        )
    })?;
    if decoded.width() <= 1 && decoded.height() <= 1 {
        return Err(ValidationError::new(
            ValidationFailure::Placeholder,
            "1x1 tracking pixel",
        ));
    }
    Ok(())
}

fn check_gif(bytes: &[u8]) -> Result<(), ValidationError> {
    let corrupt = |e: image::ImageError| {
        ValidationError::new(ValidationFailure::Corrupt, format!("failed to decode GIF: {e}"))
    };
    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(corrupt)?;

    let mut frames = 0usize;
    let mut largest = (0, 0);
    for frame in decoder.into_frames() {
        let frame = frame.map_err(corrupt)?;
        let buffer = frame.buffer();
        largest = (largest.0.max(buffer.width()), largest.1.max(buffer.height()));
        frames += 1;
    }
    if frames == 0 {
        return Err(ValidationError::new(
            ValidationFailure::Corrupt,
            "GIF contains no frames",
        ));
    }
    if largest.0 <= 1 && largest.1 <= 1 {
        return Err(ValidationError::new(
            ValidationFailure::Placeholder,
            "1x1 tracking pixel",
        ));
    }
    tracing::trace!(target: "mdimg.download", frames, "GIF decoded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};
    use mdimg_core::DEFAULT_ALLOWED_MIME_TYPES;

    fn validator() -> ContentValidator {
        ContentValidator::new(DEFAULT_ALLOWED_MIME_TYPES, 1024 * 1024)
    }

    fn encode(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([200, 30, 30, 255]),
        ));
        let img = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img
        };
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png_is_accepted_with_octet_stream() {
        let bytes = encode(ImageFormat::Png, 8, 8);
        assert_eq!(
            validator().validate(&bytes, Some("application/octet-stream")),
            Ok(ImageKind::Png)
        );
    }

    #[test]
    fn test_kind_comes_from_content_not_header() {
        let bytes = encode(ImageFormat::Gif, 4, 4);
        assert_eq!(
            validator().validate(&bytes, Some("image/jpeg")),
            Ok(ImageKind::Gif)
        );
    }

    #[test]
    fn test_truncated_png_is_corrupt() {
        let mut bytes = encode(ImageFormat::Png, 16, 16);
        bytes.truncate(bytes.len() / 2);
        let err = validator().validate(&bytes, Some("image/png")).unwrap_err();
        assert_eq!(err.failure, ValidationFailure::Corrupt);

        // Displays as its message, and works as a boxed std error
        let message = err.message.clone();
        assert_eq!(err.to_string(), message);
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(boxed.to_string(), message);
    }

    #[test]
    fn test_html_error_page_is_unsupported() {
        let err = validator()
            .check_declared(Some("text/html; charset=utf-8"), Some(10))
            .unwrap_err();
        assert_eq!(err.failure, ValidationFailure::UnsupportedType);

        let err = validator()
            .validate(b"<html><body>Not found</body></html>", None)
            .unwrap_err();
        assert_eq!(err.failure, ValidationFailure::UnsupportedType);
    }

    #[test]
    fn test_declared_length_over_limit() {
        let err = validator()
            .check_declared(Some("image/png"), Some(2 * 1024 * 1024))
            .unwrap_err();
        assert_eq!(err.failure, ValidationFailure::Oversized);
    }

    #[test]
    fn test_body_over_limit_is_oversized() {
        let small = ContentValidator::new(DEFAULT_ALLOWED_MIME_TYPES, 10);
        let bytes = encode(ImageFormat::Png, 8, 8);
        let err = small.validate(&bytes, Some("image/png")).unwrap_err();
        assert_eq!(err.failure, ValidationFailure::Oversized);
    }

    #[test]
    fn test_placeholder_svg_is_not_corrupt() {
        let placeholder =
            br#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"></svg>"#;
        let broken = b"\x89PNG\r\n\x1a\n garbage";

        let placeholder_err = validator()
            .validate(placeholder, Some("image/svg+xml"))
            .unwrap_err();
        let corrupt_err = validator().validate(broken, Some("image/png")).unwrap_err();

        assert_eq!(placeholder_err.failure, ValidationFailure::Placeholder);
        assert_eq!(corrupt_err.failure, ValidationFailure::Corrupt);
    }

    #[test]
    fn test_one_pixel_gif_is_placeholder() {
        let bytes = encode(ImageFormat::Gif, 1, 1);
        let err = validator().validate(&bytes, Some("image/gif")).unwrap_err();
        assert_eq!(err.failure, ValidationFailure::Placeholder);
    }

    #[test]
    fn test_allow_list_is_enforced_after_sniffing() {
        let png_only = ContentValidator::new(["image/png"], 1024 * 1024);
        let bytes = encode(ImageFormat::Jpeg, 8, 8);
        let err = png_only
            .validate(&bytes, Some("application/octet-stream"))
            .unwrap_err();
        assert_eq!(err.failure, ValidationFailure::UnsupportedType);
    }

    #[test]
    fn test_mime_normalisation() {
        assert_eq!(normalize_mime("Image/JPG; charset=binary"), "image/jpeg");
        assert_eq!(normalize_mime(" image/png "), "image/png");
    }
}
