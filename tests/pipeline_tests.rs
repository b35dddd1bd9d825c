mod common;

use common::{status, test_definition, MockOrchestrator, NAMESPACE};
use kube_job_runner::kubernetes::{
    demo_workload, BatchPipeline, CleanupOutcome, JobState, JobStatus, Orchestrator,
    PipelineOptions, PollSettings, UnitPhase,
};
use kube_job_runner::{OrchestratorError, PollErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn options() -> PipelineOptions {
    let mut options = PipelineOptions::new(NAMESPACE);
    options.poll = PollSettings::new(Duration::from_secs(1), Duration::from_secs(60));
    options
}

fn pipeline(mock: &Arc<MockOrchestrator>, options: PipelineOptions) -> BatchPipeline {
    let orchestrator: Arc<dyn Orchestrator> = mock.clone();
    BatchPipeline::new(orchestrator, options)
}

#[tokio::test(start_paused = true)]
async fn test_init_output_reaches_main_stage_and_resources_are_removed() {
    let message = "payload-7f3a";
    let definition = demo_workload(message).unwrap();
    let init_args = definition.init_stages()[0].args.join(" ");
    assert!(init_args.contains(message));

    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![
        Ok(status(0, 0, 0)),
        Ok(status(1, 0, 0)),
        Ok(status(0, 1, 0)),
    ])
    .await;
    mock.add_auto_unit(
        "x7k2p",
        UnitPhase::Succeeded,
        Ok(format!("Hello Main Container World!\n{}\n", message).into_bytes()),
    )
    .await;

    let report = pipeline(&mock, options())
        .run(&definition, CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.terminal.samples, 3);
    let logs = report.logs.expect("logs collected");
    let text = logs
        .log_text(&format!("{}-x7k2p", report.job_name))
        .expect("main pod log");
    assert!(text.contains(message));

    match report.cleanup {
        CleanupOutcome::Completed(cleanup) => assert_eq!(cleanup.deleted_units.len(), 1),
        other => panic!("expected completed cleanup, got {:?}", other),
    }
    assert!(!mock.job_exists(NAMESPACE, &report.job_name).await);
    assert_eq!(mock.units_matching(NAMESPACE, definition.selector()).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_keeps_resources_and_reports_logs() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![Ok(JobStatus {
        failed: 7,
        failed_condition: true,
        failure_reason: Some("BackoffLimitExceeded".to_string()),
        ..Default::default()
    })])
    .await;
    mock.add_auto_unit("crash", UnitPhase::Failed, Ok(b"exit 1".to_vec()))
        .await;
    let definition = test_definition();

    let report = pipeline(&mock, options())
        .run(&definition, CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.terminal.state, JobState::Failed);
    assert!(report.logs.is_some());
    assert!(matches!(report.cleanup, CleanupOutcome::Skipped(_)));
    assert!(mock.job_exists(NAMESPACE, &report.job_name).await);
    assert_eq!(mock.call_count("delete_job").await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_skips_cleanup() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![Ok(status(1, 0, 0))]).await;

    let err = pipeline(&mock, options())
        .run(&test_definition(), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.poll_kind(), Some(PollErrorKind::Timeout));
    assert_eq!(mock.job_count().await, 1);
    assert_eq!(mock.call_count("delete_job").await, 0);
    assert_eq!(mock.call_count("get_logs").await, 0);
}

#[tokio::test]
async fn test_submission_failure_creates_nothing() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.fail_create(OrchestratorError::Rejected("namespace not found".to_string()))
        .await;

    let err = pipeline(&mock, options())
        .run(&test_definition(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("namespace not found"));
    assert_eq!(mock.call_count("get_job_status").await, 0);
    assert_eq!(mock.job_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_leaves_job_unless_cleanup_requested() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![Ok(status(1, 0, 0))]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline(&mock, options())
        .run(&test_definition(), cancel)
        .await
        .unwrap_err();

    assert_eq!(err.poll_kind(), Some(PollErrorKind::Cancelled));
    assert_eq!(mock.job_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_with_cleanup_removes_job_and_running_pods() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![Ok(status(1, 0, 0))]).await;
    mock.add_auto_unit("busy", UnitPhase::Running, Ok(Vec::new()))
        .await;
    let mut options = options();
    options.cleanup_on_cancel = true;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let definition = test_definition();
    let err = pipeline(&mock, options)
        .run(&definition, cancel)
        .await
        .unwrap_err();

    assert_eq!(err.poll_kind(), Some(PollErrorKind::Cancelled));
    assert_eq!(mock.job_count().await, 0);
    assert_eq!(mock.call_count("delete_execution_unit").await, 1);
    assert_eq!(mock.units_matching(NAMESPACE, definition.selector()).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_log_failure_does_not_block_cleanup() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![Ok(status(0, 1, 0))]).await;
    mock.add_auto_unit(
        "quiet",
        UnitPhase::Succeeded,
        Err(OrchestratorError::Transport("stream closed".to_string())),
    )
    .await;

    let report = pipeline(&mock, options())
        .run(&test_definition(), CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.logs.is_none());
    assert!(report.log_error.unwrap().contains("stream closed"));
    assert!(matches!(report.cleanup, CleanupOutcome::Completed(_)));
    assert_eq!(mock.job_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_keep_resources_skips_cleanup() {
    let mock = Arc::new(MockOrchestrator::new());
    mock.script_statuses(vec![Ok(status(0, 1, 0))]).await;
    mock.add_auto_unit("done", UnitPhase::Succeeded, Ok(b"ok".to_vec()))
        .await;
    let mut options = options();
    options.keep_resources = true;

    let report = pipeline(&mock, options)
        .run(&test_definition(), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(report.cleanup, CleanupOutcome::Skipped(_)));
    assert_eq!(mock.job_count().await, 1);
}
