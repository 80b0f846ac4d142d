//! Document rewriting.
//!
//! Rewriting is purely textual: each original link token is replaced by the
//! same token with only its URL swapped. Tokens of images that did not
//! complete are left untouched, so a partially failed run still yields a
//! valid document.

use crate::task::{ImageTask, TaskStatus};

/// Return `token` with the occurrence of `raw_url` that forms its link target
/// replaced by `new_url`.
///
/// For Markdown tokens the target follows `](`; for HTML tokens it follows the
/// `src` attribute. Alt or title text that happens to contain the URL is not
/// touched.
#[must_use]
pub fn retarget_token(token: &str, raw_url: &str, new_url: &str) -> String {
    let anchor = if token.starts_with('!') {
        token.find("](").map(|i| i + 2)
    } else {
        find_src_attribute(token)
    };

    let start = anchor
        .and_then(|from| token[from..].find(raw_url).map(|i| from + i))
        .or_else(|| token.find(raw_url));

    match start {
        Some(start) => {
            let mut rewritten = String::with_capacity(token.len() + new_url.len());
            rewritten.push_str(&token[..start]);
            rewritten.push_str(new_url);
            rewritten.push_str(&token[start + raw_url.len()..]);
            rewritten
        }
        None => token.to_string(),
    }
}

fn find_src_attribute(token: &str) -> Option<usize> {
    let lower = token.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut from = 0;
    while let Some(i) = lower[from..].find("src") {
        let at = from + i;
        let preceded_by_space = at > 0 && bytes[at - 1].is_ascii_whitespace();
        let rest = lower[at + 3..].trim_start();
        if preceded_by_space && rest.starts_with('=') {
            return Some(at + 3);
        }
        from = at + 3;
    }
    None
}

/// Rewrite `document` so every completed task's token points at its public URL.
///
/// Every verbatim occurrence of a completed token is replaced. Tasks in any
/// other state keep their original link.
#[must_use]
pub fn rewrite_document(document: &str, tasks: &[ImageTask]) -> String {
    let mut rewritten = document.to_string();
    for task in tasks {
        if task.status != TaskStatus::Completed {
            continue;
        }
        let Some(public_url) = task.public_url.as_deref() else {
            continue;
        };
        let replacement = retarget_token(&task.token, &task.raw_url, public_url);
        if replacement != task.token {
            rewritten = rewritten.replace(&task.token, &replacement);
        }
    }
    rewritten
}
