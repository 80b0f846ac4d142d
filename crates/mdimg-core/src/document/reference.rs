//! Image reference extraction.
//!
//! Recognises Markdown image links (`![alt](url "title")`) and HTML `<img>`
//! tags with `src`/`alt`/`title` attributes in any order. References from both
//! syntaxes are merged and returned in document order.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(\s*([^\s)]+)(?:\s+(?:"([^"]*)"|'([^']*)'))?\s*\)"#)
        .expect("valid markdown image regex")
});

static HTML_IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid img tag regex"));

static HTML_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)(src|alt|title)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid html attribute regex")
});

/// Link syntax an image reference was written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSyntax {
    Markdown,
    Html,
}

/// A single image link found in a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Alternate text (may be empty).
    pub alt: String,
    /// Normalised absolute URL used for fetching.
    pub url: String,
    /// Optional title attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// URL exactly as written inside `token`.
    pub raw_url: String,
    /// The verbatim link text in the source document.
    pub token: String,
    /// Which syntax produced this reference.
    pub syntax: LinkSyntax,
    /// Byte offset of `token` in the document.
    pub offset: usize,
}

/// A link that looked like an image but cannot be migrated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLink {
    pub raw_url: String,
    pub token: String,
    pub reason: String,
}

/// Result of scanning a document for image links.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Eligible references in document order.
    pub references: Vec<ImageReference>,
    /// Links skipped because their URL is not migratable.
    pub skipped: Vec<SkippedLink>,
}

impl Extraction {
    /// Number of links that were found but not eligible.
    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Scan `document` for Markdown and HTML image links.
///
/// Links whose URL is not an absolute `http`/`https` URL with a host and a
/// non-root path are skipped with a warning and reported in
/// [`Extraction::skipped`].
#[must_use]
pub fn extract_references(document: &str) -> Extraction {
    let mut candidates = Vec::new();

    for caps in MARKDOWN_IMAGE.captures_iter(document) {
        let (Some(whole), Some(raw_url)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        candidates.push(Candidate {
            alt: caps.get(1).map_or_else(String::new, |m| m.as_str().to_string()),
            raw_url: raw_url.as_str().to_string(),
            title: caps
                .get(3)
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string()),
            token: whole.as_str().to_string(),
            syntax: LinkSyntax::Markdown,
            offset: whole.start(),
        });
    }

    for tag in HTML_IMG_TAG.find_iter(document) {
        let mut src = None;
        let mut alt = String::new();
        let mut title = None;
        for caps in HTML_ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                Some("src") => src = Some(value.to_string()),
                Some("alt") => alt = value.to_string(),
                Some("title") => title = Some(value.to_string()),
                _ => {}
            }
        }
        let Some(raw_url) = src else {
            continue;
        };
        candidates.push(Candidate {
            alt,
            raw_url,
            title,
            token: tag.as_str().to_string(),
            syntax: LinkSyntax::Html,
            offset: tag.start(),
        });
    }

    candidates.sort_by_key(|c| c.offset);

    let mut extraction = Extraction::default();
    for candidate in candidates {
        match normalize_url(&candidate.raw_url, candidate.syntax) {
            Ok(url) => extraction.references.push(ImageReference {
                alt: candidate.alt,
                url,
                title: candidate.title,
                raw_url: candidate.raw_url,
                token: candidate.token,
                syntax: candidate.syntax,
                offset: candidate.offset,
            }),
            Err(reason) => {
                tracing::warn!(
                    target: "mdimg.pipeline",
                    url = %candidate.raw_url,
                    %reason,
                    "Skipping image link"
                );
                extraction.skipped.push(SkippedLink {
                    raw_url: candidate.raw_url,
                    token: candidate.token,
                    reason,
                });
            }
        }
    }
    extraction
}

struct Candidate {
    alt: String,
    raw_url: String,
    title: Option<String>,
    token: String,
    syntax: LinkSyntax,
    offset: usize,
}

/// Check that `raw` is a migratable URL and return its fetchable form.
fn normalize_url(raw: &str, syntax: LinkSyntax) -> Result<String, String> {
    let trimmed = raw.trim().trim_start_matches('<').trim_end_matches('>');
    let candidate = match syntax {
        LinkSyntax::Html => trimmed.replace("&amp;", "&"),
        LinkSyntax::Markdown => trimmed.to_string(),
    };

    let parsed = Url::parse(&candidate).map_err(|e| format!("unparseable URL: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", parsed.scheme()));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }
    if matches!(parsed.path(), "" | "/") {
        return Err("missing path".to_string());
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_reference_with_title() {
        let doc = r#"Intro ![logo](https://cdn.example.com/a/logo.png "Company") outro"#;
        let extraction = extract_references(doc);

        assert_eq!(extraction.references.len(), 1);
        let r = &extraction.references[0];
        assert_eq!(r.alt, "logo");
        assert_eq!(r.url, "https://cdn.example.com/a/logo.png");
        assert_eq!(r.title.as_deref(), Some("Company"));
        assert_eq!(
            r.token,
            r#"![logo](https://cdn.example.com/a/logo.png "Company")"#
        );
        assert_eq!(r.syntax, LinkSyntax::Markdown);
        assert_eq!(r.offset, 6);
    }

    #[test]
    fn test_markdown_title_may_contain_the_other_quote() {
        let doc = r#"![a](http://x.example/y.png "it's") and ![b](http://x.example/z.png 'say "hi"')"#;
        let extraction = extract_references(doc);

        assert_eq!(extraction.references.len(), 2);
        assert_eq!(extraction.references[0].title.as_deref(), Some("it's"));
        assert_eq!(
            extraction.references[0].token,
            r#"![a](http://x.example/y.png "it's")"#
        );
        assert_eq!(extraction.references[1].title.as_deref(), Some(r#"say "hi""#));
        assert_eq!(extraction.invalid_count(), 0);
    }

    #[test]
    fn test_html_attributes_in_any_order() {
        let doc = r#"<p><img alt="chart" class="wide" src="http://img.example.org/c.jpg?x=1&amp;y=2"></p>"#;
        let extraction = extract_references(doc);

        assert_eq!(extraction.references.len(), 1);
        let r = &extraction.references[0];
        assert_eq!(r.alt, "chart");
        assert_eq!(r.raw_url, "http://img.example.org/c.jpg?x=1&amp;y=2");
        assert_eq!(r.url, "http://img.example.org/c.jpg?x=1&y=2");
        assert_eq!(r.syntax, LinkSyntax::Html);
    }

    #[test]
    fn test_data_src_is_not_src() {
        let doc = r#"<img data-src="http://a.example/lazy.png" src='http://a.example/real.png'>"#;
        let extraction = extract_references(doc);
        assert_eq!(extraction.references.len(), 1);
        assert_eq!(extraction.references[0].url, "http://a.example/real.png");
    }

    #[test]
    fn test_mixed_syntax_sorted_by_offset() {
        let doc = concat!(
            "<img src=\"http://h.example/first.png\">\n",
            "![second](http://h.example/second.png)\n",
            "<IMG SRC=\"http://h.example/third.png\">",
        );
        let urls: Vec<_> = extract_references(doc)
            .references
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://h.example/first.png",
                "http://h.example/second.png",
                "http://h.example/third.png",
            ]
        );
    }

    #[test]
    fn test_ineligible_links_are_skipped_and_counted() {
        let doc = concat!(
            "![rel](images/local.png)\n",
            "![data](data:image/png;base64,AAAA)\n",
            "![root](https://example.com/)\n",
            "![ftp](ftp://example.com/a.png)\n",
            "![ok](https://example.com/ok.png)\n",
        );
        let extraction = extract_references(doc);
        assert_eq!(extraction.references.len(), 1);
        assert_eq!(extraction.invalid_count(), 4);
    }

    #[test]
    fn test_duplicate_links_are_separate_references() {
        let doc = "![a](http://x.example/p.png) and again ![a](http://x.example/p.png)";
        let extraction = extract_references(doc);
        assert_eq!(extraction.references.len(), 2);
        assert!(extraction.references[0].offset < extraction.references[1].offset);
    }

    #[test]
    fn test_plain_links_are_ignored() {
        let doc = "[not an image](http://x.example/p.png)";
        assert!(extract_references(doc).references.is_empty());
    }
}
