//! Document scanning and rewriting.
//!
//! Pure text operations with no I/O dependencies.

mod reference;
mod rewrite;

pub use reference::{Extraction, ImageReference, LinkSyntax, SkippedLink, extract_references};
pub use rewrite::{retarget_token, rewrite_document};
