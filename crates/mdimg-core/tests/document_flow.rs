//! End-to-end checks of the pure document flow: extract, plan, settle, rewrite.

use mdimg_core::{
    MigrationError, MigrationReport, PipelineState, RunCounters, TaskId, TaskStatus,
    extract_references, plan_tasks, rewrite_document,
};

const DOCUMENT: &str = r#"# Trip report

![harbour](https://photos.example.com/2024/harbour.jpg "At dawn")

Some text with a [normal link](https://example.com/page).

<img src="https://photos.example.com/2024/map.png" alt="map">

![relative](./local/thing.png)

![harbour](https://photos.example.com/2024/harbour.jpg "At dawn")

![missing](https://photos.example.com/2024/gone.webp)
"#;

#[test]
fn test_task_count_equals_valid_references() {
    let extraction = extract_references(DOCUMENT);
    let task_id = TaskId::new("trip").unwrap();
    let plan = plan_tasks(&task_id, DOCUMENT, &extraction, None, 3);

    assert_eq!(extraction.references.len(), 4);
    assert_eq!(extraction.invalid_count(), 1);
    assert_eq!(plan.tasks.len(), extraction.references.len());

    let indexes: Vec<_> = plan.tasks.iter().map(|t| t.index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
}

#[test]
fn test_partial_success_rewrites_only_completed_links() {
    let extraction = extract_references(DOCUMENT);
    let task_id = TaskId::new("trip").unwrap();
    let mut tasks = plan_tasks(&task_id, DOCUMENT, &extraction, None, 3).tasks;

    for task in &mut tasks {
        task.begin_download().unwrap();
        if task.url.ends_with("gone.webp") {
            task.fail(&MigrationError::http_status(404)).unwrap();
            continue;
        }
        task.begin_validation().unwrap();
        task.begin_upload("c0ffee", "image/png", 42).unwrap();
        let public = format!("https://cdn.example.net/{}", task.remote_key);
        task.complete(public).unwrap();
    }

    let rewritten = rewrite_document(DOCUMENT, &tasks);
    assert!(rewritten.contains(
        r#"![harbour](https://cdn.example.net/images/trip/image_0.jpg "At dawn")"#
    ));
    assert!(!rewritten.contains("https://photos.example.com/2024/harbour.jpg"));
    assert!(rewritten.contains(r#"<img src="https://cdn.example.net/images/trip/image_1.png" alt="map">"#));
    assert!(rewritten.contains("![missing](https://photos.example.com/2024/gone.webp)"));
    assert!(rewritten.contains("![relative](./local/thing.png)"));

    let report = MigrationReport::new(
        rewritten,
        &tasks,
        RunCounters {
            invalid_references: extraction.invalid_count(),
            ..RunCounters::default()
        },
    );
    assert_eq!(report.state, PipelineState::Failed { failed: 1 });
    assert_eq!(report.summary.invalid_references, 1);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.outcomes["https://photos.example.com/2024/gone.webp"].detail,
        "HTTP 404"
    );
    assert!(tasks.iter().filter(|t| t.status == TaskStatus::Completed).count() == 3);
}
