mod common;

use common::{init_tracing, FakeBackend};
use sentiment_pipeline::{
    ClassificationBackend, ClassificationScheduler, EnsembleClassifier, Label, PipelineError,
};
use std::sync::Arc;
use std::time::Duration;

fn three_member_ensemble() -> EnsembleClassifier {
    EnsembleClassifier::new(
        vec!["model-a".to_string(), "model-b".to_string(), "model-c".to_string()],
        Label::neutral(),
    )
    .unwrap()
}

fn texts(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[tokio::test]
async fn test_ensemble_majority_vote() {
    init_tracing();
    let backend = FakeBackend::with_overrides(&[("model-c", "negative")]);
    let connection = backend.connect().await.unwrap();

    let label = three_member_ensemble()
        .classify_one(connection.as_ref(), "great quarter")
        .await
        .unwrap();

    assert_eq!(label, Label::new("positive"));
    assert_eq!(backend.call_count(), 3);
    // All three members were asked at once.
    assert_eq!(backend.max_in_flight(), 3);
}

#[tokio::test]
async fn test_ensemble_without_quorum_uses_default_label() {
    init_tracing();
    let backend =
        FakeBackend::with_overrides(&[("model-a", "positive"), ("model-b", "negative")]);
    let connection = backend.connect().await.unwrap();
    let ensemble = EnsembleClassifier::new(
        vec!["model-a".to_string(), "model-b".to_string(), "model-c".to_string()],
        Label::new("undecided"),
    )
    .unwrap();

    // model-c falls back to the keyword label: neutral
    let label = ensemble
        .classify_one(connection.as_ref(), "shares moved")
        .await
        .unwrap();

    assert_eq!(label, Label::new("undecided"));
}

#[tokio::test]
async fn test_ensemble_empty_text_is_neutral_without_calls() {
    init_tracing();
    let backend = FakeBackend::new();
    let connection = backend.connect().await.unwrap();

    let label = three_member_ensemble()
        .classify_one(connection.as_ref(), "")
        .await
        .unwrap();

    assert_eq!(label, Label::neutral());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_ensemble_member_failure_fails_the_vote() {
    init_tracing();
    let backend = FakeBackend::failing("model-b");
    let connection = backend.connect().await.unwrap();

    let err = three_member_ensemble()
        .classify_one(connection.as_ref(), "love it")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Backend { status: 500, .. }));
    assert!(err.is_backend_failure());
}

#[test]
fn test_ensemble_needs_members() {
    let err = EnsembleClassifier::new(Vec::new(), Label::neutral()).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
}

#[tokio::test]
async fn test_classify_all_runs_blocks_of_bounded_size() {
    init_tracing();
    let backend = FakeBackend::new();
    let scheduler = ClassificationScheduler::new(Arc::new(backend.clone()), three_member_ensemble());
    let input = texts(&["love a", "hate b", "plain c", "great d", "awful e"]);

    let labels = scheduler.classify_all(&input, 2).await.unwrap();

    assert_eq!(labels.len(), 5);
    assert_eq!(labels["love a"], Label::new("positive"));
    assert_eq!(labels["hate b"], Label::new("negative"));
    assert_eq!(labels["plain c"], Label::neutral());
    assert_eq!(backend.call_count(), 15);
    // Two texts of three members each overlap, never more.
    assert_eq!(backend.max_in_flight(), 6);
    assert_eq!(backend.connects(), 1);

    // Blocks run in input order: [a, b], [c, d], [e].
    let order: Vec<String> = backend
        .calls()
        .into_iter()
        .filter(|(member, _)| member == "model-a")
        .map(|(_, text)| text)
        .collect();
    let first_block: Vec<&str> = order[..2].iter().map(String::as_str).collect();
    assert!(first_block.contains(&"love a") && first_block.contains(&"hate b"));
    assert_eq!(order[4], "awful e");
}

#[tokio::test]
async fn test_classify_all_dedups_and_short_circuits_empty_text() {
    init_tracing();
    let backend = FakeBackend::new();
    let scheduler = ClassificationScheduler::new(Arc::new(backend.clone()), three_member_ensemble());
    let input = texts(&["love it", "", "love it"]);

    let labels = scheduler.classify_all(&input, 10).await.unwrap();

    assert_eq!(labels.len(), 2);
    assert_eq!(labels[""], Label::neutral());
    assert_eq!(backend.call_count(), 3);
}

#[tokio::test]
async fn test_classify_all_without_work_does_not_connect() {
    init_tracing();
    let backend = FakeBackend::new();
    let scheduler = ClassificationScheduler::new(Arc::new(backend.clone()), three_member_ensemble());

    let labels = scheduler.classify_all(&[], 4).await.unwrap();

    assert!(labels.is_empty());
    assert_eq!(backend.connects(), 0);
}

#[tokio::test]
async fn test_classify_all_propagates_backend_failure() {
    init_tracing();
    let backend = FakeBackend::failing("model-c");
    let scheduler = ClassificationScheduler::new(Arc::new(backend), three_member_ensemble());

    let err = scheduler
        .classify_all(&texts(&["one", "two", "three"]), 2)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Backend { .. }));
}

#[tokio::test]
async fn test_classify_all_rejects_zero_block_size() {
    let scheduler =
        ClassificationScheduler::new(Arc::new(FakeBackend::new()), three_member_ensemble());
    let err = scheduler
        .classify_all(&texts(&["text"]), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
}

#[tokio::test]
async fn test_failing_member_cancels_slower_siblings() {
    init_tracing();
    let backend = FakeBackend::failing_fast("model-b", Duration::from_millis(200));
    let connection = backend.connect().await.unwrap();

    let err = three_member_ensemble()
        .classify_one(connection.as_ref(), "love it")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Backend { .. }));

    // Long enough for the siblings to have answered had they kept running.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.call_count(), 3);
    assert_eq!(backend.completed(), 0);
}

#[tokio::test]
async fn test_classify_all_releases_its_connection() {
    init_tracing();
    let backend = FakeBackend::new();
    let scheduler = ClassificationScheduler::new(Arc::new(backend.clone()), three_member_ensemble());
    scheduler
        .classify_all(&texts(&["love a", "hate b", "plain c"]), 2)
        .await
        .unwrap();
    assert_eq!(backend.connects(), 1);
    assert_eq!(backend.releases(), 1);

    let backend = FakeBackend::failing_fast("model-a", Duration::from_millis(200));
    let scheduler = ClassificationScheduler::new(Arc::new(backend.clone()), three_member_ensemble());
    let err = scheduler
        .classify_all(&texts(&["love a", "hate b", "plain c"]), 2)
        .await
        .unwrap_err();
    assert!(err.is_backend_failure());
    assert_eq!(backend.connects(), 1);
    assert_eq!(backend.releases(), 1);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.completed(), 0);
}
