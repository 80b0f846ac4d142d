//! SVG structural and placeholder checks.
//!
//! Vector images are not rendered. An SVG is accepted when it contains an
//! opening and closing `svg` element and carries none of the markers that
//! identify invisible tracking placeholders.

/// Markers of 1x1 or fully transparent placeholder images.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "width='1' height='1'",
    "width=\"1\" height=\"1\"",
    "fill-opacity='0'",
    "fill-opacity=\"0\"",
    "translate(-249.000000, -126.000000)",
];

/// Outcome of inspecting SVG text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SvgCheck {
    Valid,
    Placeholder,
    Malformed,
}

/// True if the start of `bytes` looks like an XML or SVG document.
pub(crate) fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with("<?xml") || trimmed.starts_with("<svg") || trimmed.contains("<svg")
}

pub(crate) fn inspect(bytes: &[u8]) -> SvgCheck {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return SvgCheck::Malformed;
    };
    if !(text.contains("<svg") && text.contains("</svg>")) {
        return SvgCheck::Malformed;
    }
    if PLACEHOLDER_MARKERS.iter().any(|marker| text.contains(marker)) {
        return SvgCheck::Placeholder;
    }
    SvgCheck::Valid
}
