//! Plain-text rendering of reports and extractions.

use std::fmt::Write as _;

use mdimg_core::{Extraction, MigrationReport, PipelineState};

/// Shorten `url` to at most `max_len` characters, keeping its tail.
pub fn truncate_url(url: &str, max_len: usize) -> String {
    let count = url.chars().count();
    if count <= max_len {
        return url.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let tail: String = url.chars().skip(count - keep).collect();
    format!("...{tail}")
}

/// Render the summary table of a finished run.
pub fn format_summary(report: &MigrationReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    let state = match report.state {
        PipelineState::Completed => "completed".to_string(),
        PipelineState::Failed { failed } => format!("failed ({failed})"),
        PipelineState::Running => "running".to_string(),
        PipelineState::Idle => "idle".to_string(),
    };

    let _ = writeln!(out, "Migration {state}");
    let _ = writeln!(out, "{}", "-".repeat(40));
    let rows = [
        ("Images", s.total),
        ("Migrated", s.successful),
        ("Failed", s.failed.len()),
        ("Placeholders", s.placeholders),
        ("Corrupt", s.corrupt),
        ("Deduplicated", s.deduplicated),
        ("Resumed", s.resumed),
        ("Invalid links", s.invalid_references),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "{label:<16}{value:>8}");
    }
    if s.cancelled {
        let _ = writeln!(out, "Run was cancelled; rerun with the same --task-id to resume.");
    }
    if !s.failed.is_empty() {
        let _ = writeln!(out, "\nFailed images:");
        for failed in &s.failed {
            let _ = writeln!(out, "  {}  {}", truncate_url(&failed.url, 60), failed.reason);
        }
    }
    out
}

pub fn print_summary(report: &MigrationReport) {
    print!("{}", format_summary(report));
}

pub fn print_extraction(extraction: &Extraction) {
    println!("{} image reference(s)", extraction.references.len());
    for (index, reference) in extraction.references.iter().enumerate() {
        println!("  [{index}] {:?}  {}", reference.syntax, reference.url);
    }
    if !extraction.skipped.is_empty() {
        println!("{} skipped link(s)", extraction.invalid_count());
        for skipped in &extraction.skipped {
            println!("  {}  ({})", skipped.raw_url, skipped.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use mdimg_core::{FailedImage, RunCounters, RunSummary};

    use super::*;

    #[test]
    fn test_truncate_url_keeps_tail() {
        assert_eq!(truncate_url("http://a/b.png", 40), "http://a/b.png");
        assert_eq!(truncate_url("https://example.com/images/pic.png", 10), "...pic.png");
    }

    #[test]
    fn test_summary_lists_failures() {
        let mut report = MigrationReport::new(String::new(), &[], RunCounters::default());
        report.summary = RunSummary {
            total: 3,
            successful: 2,
            failed: vec![FailedImage {
                url: "https://h/c.png".to_string(),
                reason: "HTTP 404".to_string(),
                kind: None,
            }],
            ..RunSummary::default()
        };
        report.state = report.summary.final_state();

        let text = format_summary(&report);
        assert!(text.contains("Migration failed (1)"));
        assert!(text.contains("https://h/c.png  HTTP 404"));
        assert!(text.contains("Migrated"));
    }
}
