//! Analysis run lifecycle tests driven through the dashboard facade.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use streamlens_rs_config::{ChannelConfig, EndpointsConfig, StreamlensConfig};
use streamlens_rs_core::{Dashboard, RunHandle, RunStatus, StreamlensCoreError};
use streamlens_rs_protocol::SourceType;
use streamlens_rs_test_utils::{StubBackend, notify_end, notify_frame, notify_summary};

/// Config pointing the dashboard at an in-process backend.
fn test_config(websocket_url: String) -> StreamlensConfig {
    StreamlensConfig::builder()
        .endpoints(EndpointsConfig {
            websocket_url,
            http_url: "http://127.0.0.1:9".to_string(),
        })
        .channel(ChannelConfig {
            reconnect_delay_ms: 50,
            request_timeout_secs: Some(5),
            listing_stagger_ms: 25,
            ..Default::default()
        })
        .build()
}

/// Job submissions are acknowledged with an action-less frame.
fn job_ack_backend() -> impl Fn(&serde_json::Value) -> Vec<serde_json::Value> {
    |_request| vec![json!({ "statusCode": 200, "body": "{}" })]
}

/// Block until the run has collected at least `count` frames.
async fn wait_for_frames(handle: &RunHandle, count: usize) {
    let mut updates = handle.updates();
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.frames().len() < count {
            updates.changed().await.expect("run updates");
        }
    })
    .await
    .expect("frames in time")
}

/// Frames accumulate as pushes arrive, the end marker publishes the task id,
/// and the summary completes the run.
#[tokio::test]
async fn analysis_run_collects_frames_and_summary() {
    let backend = StubBackend::spawn(job_ack_backend()).await;
    let dashboard =
        Dashboard::new(test_config(backend.url()), "ops").expect("dashboard");
    assert!(dashboard.wait_connected().await);

    let run = dashboard
        .start_analysis(SourceType::S3, "ops/videos/dock.mp4")
        .expect("start analysis");
    assert_eq!(run.status(), RunStatus::Pending);

    backend.push(notify_frame(
        "task-1",
        "2024-05-01 10:00:00",
        "https://media/frames/0.jpg",
        "a forklift idles by the dock",
    ));
    backend.push(notify_frame(
        "task-1",
        "2024-05-01 10:00:05",
        "https://media/frames/1.jpg",
        "the forklift lifts a pallet",
    ));
    wait_for_frames(&run, 2).await;
    assert_eq!(run.status(), RunStatus::Streaming);

    backend.push(notify_end("task-1"));
    let task_id = tokio::time::timeout(Duration::from_secs(5), run.wait_for_end())
        .await
        .expect("end in time");
    assert_eq!(task_id.as_deref(), Some("task-1"));

    backend.push(notify_summary("the shift ran without incident"));
    let summary = tokio::time::timeout(Duration::from_secs(5), run.wait_for_summary())
        .await
        .expect("summary in time");
    assert_eq!(summary.as_deref(), Some("the shift ran without incident"));

    let snapshot = run.snapshot();
    assert_eq!(snapshot.frames.len(), 2);
    assert_eq!(
        snapshot.frames[0].analysis_result,
        "a forklift idles by the dock"
    );
    assert!(snapshot.ended);
    assert_eq!(snapshot.status, RunStatus::Complete);
    backend.shutdown();
}

/// Starting a new run freezes the old handle and keeps late pushes from the
/// superseded task out of the new one.
#[tokio::test]
async fn restarting_analysis_fences_out_the_old_task() {
    let backend = StubBackend::spawn(job_ack_backend()).await;
    let dashboard =
        Dashboard::new(test_config(backend.url()), "ops").expect("dashboard");
    assert!(dashboard.wait_connected().await);

    let first = dashboard
        .start_analysis(SourceType::S3, "ops/videos/dock.mp4")
        .expect("start first run");
    backend.push(notify_frame(
        "task-1",
        "2024-05-01 10:00:00",
        "https://media/frames/0.jpg",
        "a forklift idles by the dock",
    ));
    wait_for_frames(&first, 1).await;

    let second = dashboard
        .start_analysis(SourceType::Kvs, "dock-cam")
        .expect("start second run");
    assert!(second.snapshot().generation > first.snapshot().generation);

    // Late push from the superseded task, then the real first frame.
    backend.push(notify_frame(
        "task-1",
        "2024-05-01 10:00:05",
        "https://media/frames/1.jpg",
        "the forklift lifts a pallet",
    ));
    backend.push(notify_frame(
        "task-2",
        "2024-05-01 11:00:00",
        "https://media/frames/2.jpg",
        "a truck backs up to the dock",
    ));
    wait_for_frames(&second, 1).await;

    assert_eq!(second.frames().len(), 1);
    assert_eq!(second.frames()[0].task_id, "task-2");
    assert_eq!(first.frames().len(), 1);
    assert_eq!(
        first.frames()[0].analysis_result,
        "a forklift idles by the dock"
    );
    backend.shutdown();
}

/// Follow-up operations on a run are gated until its end marker reports the
/// task id.
#[tokio::test]
async fn followups_wait_for_the_task_id() {
    let backend = StubBackend::spawn(job_ack_backend()).await;
    let dashboard =
        Dashboard::new(test_config(backend.url()), "ops").expect("dashboard");
    assert!(dashboard.wait_connected().await);

    let run = dashboard
        .start_analysis(SourceType::S3, "ops/videos/dock.mp4")
        .expect("start analysis");
    assert!(matches!(
        dashboard.session_for(&run),
        Err(StreamlensCoreError::RunNotReady)
    ));
    assert!(matches!(
        dashboard.run_agent_for(&run, "count forklifts", 1).await,
        Err(StreamlensCoreError::RunNotReady)
    ));

    backend.push(notify_end("task-1"));
    tokio::time::timeout(Duration::from_secs(5), run.wait_for_end())
        .await
        .expect("end in time");

    let session = dashboard.session_for(&run).expect("session");
    assert_eq!(session.task_id(), "task-1");
    backend.shutdown();
}

/// Closing the dashboard tears down the channel and the push consumer.
#[tokio::test]
async fn dashboard_close_is_clean() {
    let backend = StubBackend::spawn(job_ack_backend()).await;
    let dashboard =
        Dashboard::new(test_config(backend.url()), "ops").expect("dashboard");
    assert!(dashboard.wait_connected().await);

    tokio::time::timeout(Duration::from_secs(5), dashboard.close())
        .await
        .expect("close in time");
    backend.shutdown();
}
