//! Channel integration tests against an in-process websocket backend.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use streamlens_rs_config::ChannelConfig;
use streamlens_rs_core::{ChannelClient, StreamlensCoreError};
use streamlens_rs_protocol::Request;
use streamlens_rs_test_utils::{StubBackend, error_reply, reply, with_correlation};

fn test_channel_config() -> ChannelConfig {
    ChannelConfig {
        reconnect_delay_ms: 50,
        request_timeout_secs: Some(5),
        ..Default::default()
    }
}

/// Outbound frames carry the action tag and a generated correlation id.
#[tokio::test]
async fn requests_carry_action_and_correlation_id() {
    let backend = StubBackend::spawn(|request| {
        vec![reply(
            "get_s3_video_url",
            200,
            &json!({ "s3_video_url": format!("https://media/{}", request["video_object_key"].as_str().unwrap_or("")) }),
        )]
    })
    .await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());

    let reply = channel
        .call(Request::GetS3VideoUrl {
            video_object_key: "public/demo.mp4".to_string(),
        })
        .await
        .expect("reply");
    assert_eq!(reply.status_code(), 200);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["action"], "get_s3_video_url");
    assert_eq!(requests[0]["video_object_key"], "public/demo.mp4");
    assert!(requests[0]["correlation_id"].is_string());
    backend.shutdown();
}

/// Without echoed correlation ids, replies pair with callers in FIFO order.
#[tokio::test]
async fn replies_pair_fifo_per_action() {
    let backend = StubBackend::spawn(|request| {
        let key = request["video_object_key"].as_str().unwrap_or("").to_string();
        vec![reply(
            "get_s3_video_url",
            200,
            &json!({ "s3_video_url": format!("https://media/{key}") }),
        )]
    })
    .await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());
    assert!(channel.wait_connected().await);

    let first = channel.call(Request::GetS3VideoUrl {
        video_object_key: "a.mp4".to_string(),
    });
    let second = channel.call(Request::GetS3VideoUrl {
        video_object_key: "b.mp4".to_string(),
    });
    let (first, second) = tokio::join!(first, second);

    let first_url: streamlens_rs_protocol::PlaybackUrl =
        first.expect("first").decode_body().expect("decode first");
    let second_url: streamlens_rs_protocol::PlaybackUrl = second
        .expect("second")
        .decode_body()
        .expect("decode second");
    assert_eq!(first_url.s3_video_url, "https://media/a.mp4");
    assert_eq!(second_url.s3_video_url, "https://media/b.mp4");
    backend.shutdown();
}

/// Echoed correlation ids pair replies even when they arrive out of order.
#[tokio::test]
async fn echoed_correlation_ids_pair_out_of_order_replies() {
    let held: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let backend = {
        let held = held.clone();
        StubBackend::spawn(move |request| {
            let key = request["video_object_key"].as_str().unwrap_or("").to_string();
            let response = with_correlation(
                reply(
                    "get_s3_video_url",
                    200,
                    &json!({ "s3_video_url": format!("https://media/{key}") }),
                ),
                request,
            );
            let mut held = held.lock();
            match held.take() {
                // Hold back the first reply and release it after the second.
                None => {
                    *held = Some(response);
                    Vec::new()
                }
                Some(first_response) => vec![response, first_response],
            }
        })
        .await
    };
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());
    assert!(channel.wait_connected().await);

    let first = channel.call(Request::GetS3VideoUrl {
        video_object_key: "a.mp4".to_string(),
    });
    let second = channel.call(Request::GetS3VideoUrl {
        video_object_key: "b.mp4".to_string(),
    });
    let (first, second) = tokio::join!(first, second);

    let first_url: streamlens_rs_protocol::PlaybackUrl =
        first.expect("first").decode_body().expect("decode first");
    let second_url: streamlens_rs_protocol::PlaybackUrl = second
        .expect("second")
        .decode_body()
        .expect("decode second");
    assert_eq!(first_url.s3_video_url, "https://media/a.mp4");
    assert_eq!(second_url.s3_video_url, "https://media/b.mp4");
    backend.shutdown();
}

/// Non-success status codes become typed backend errors with the message
/// extracted from the body.
#[tokio::test]
async fn non_success_replies_surface_backend_errors() {
    let backend = StubBackend::spawn(|_request| {
        vec![reply(
            "delete_resource",
            500,
            &json!({ "error": "table unavailable" }),
        )]
    })
    .await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());

    let err = channel
        .call(Request::DeleteResource {
            user_id: "ops".to_string(),
            period: 1,
        })
        .await
        .expect_err("backend error");
    match err {
        StreamlensCoreError::Backend {
            action,
            status,
            message,
        } => {
            assert_eq!(action, "delete_resource");
            assert_eq!(status, 500);
            assert_eq!(message, "table unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    backend.shutdown();
}

/// Status-only failure frames, as connection-level error paths produce,
/// also resolve the caller with a typed error.
#[tokio::test]
async fn status_only_error_frames_resolve_by_correlation_id() {
    let backend = StubBackend::spawn(|request| {
        vec![with_correlation(
            error_reply(500, "stringified failure"),
            request,
        )]
    })
    .await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());

    let err = channel
        .call(Request::OpensearchRetrieve {
            user_id: "ops".to_string(),
            keyword: "forklift".to_string(),
            timestamp_start: None,
            timestamp_end: None,
        })
        .await
        .expect_err("backend error");
    match err {
        StreamlensCoreError::Backend { status, message, .. } => {
            assert_eq!(status, 500);
            assert_eq!(message, "stringified failure");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    backend.shutdown();
}

/// Malformed frames are dropped without disturbing pending calls.
#[tokio::test]
async fn malformed_frames_do_not_disturb_pending_calls() {
    let backend = StubBackend::spawn(|_request| Vec::new()).await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());
    assert!(channel.wait_connected().await);

    let pending = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .call(Request::GetKvsStreamingUrl {
                    stream_name: "dock-cam".to_string(),
                })
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    backend.push_raw("{ not json at all");
    backend.push_raw("[1, 2, 3]");
    backend.push(reply(
        "get_kvs_streaming_url",
        200,
        &json!({ "streaming_url": "https://kvs/hls" }),
    ));

    let reply = pending.await.expect("join").expect("reply");
    let streaming: streamlens_rs_protocol::StreamingUrl =
        reply.decode_body().expect("decode");
    assert_eq!(streaming.streaming_url, "https://kvs/hls");
    backend.shutdown();
}

/// Requests queued before the first session is live flush once it is.
#[tokio::test]
async fn queued_requests_flush_after_connect() {
    let backend = StubBackend::spawn(|_request| {
        vec![reply(
            "get_kvs_streaming_url",
            200,
            &json!({ "streaming_url": "https://kvs/hls" }),
        )]
    })
    .await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());

    // No wait_connected: the call is queued while the dial is in flight.
    let reply = channel
        .call(Request::GetKvsStreamingUrl {
            stream_name: "dock-cam".to_string(),
        })
        .await
        .expect("reply");
    assert_eq!(reply.status_code(), 200);
    backend.shutdown();
}

/// The supervisor reconnects after the backend drops the session, and the
/// connected flag tracks both transitions.
#[tokio::test]
async fn reconnects_after_dropped_session() {
    let backend = StubBackend::spawn(|_request| {
        vec![reply(
            "get_kvs_streaming_url",
            200,
            &json!({ "streaming_url": "https://kvs/hls" }),
        )]
    })
    .await;
    let channel = ChannelClient::connect(backend.url(), &test_channel_config());
    assert!(channel.wait_connected().await);

    let mut connected = channel.connected_watch();
    backend.drop_connections();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *connected.borrow() {
            connected.changed().await.expect("watch");
        }
    })
    .await
    .expect("observe disconnect");

    assert!(
        tokio::time::timeout(Duration::from_secs(5), channel.wait_connected())
            .await
            .expect("reconnect in time")
    );
    let reply = channel
        .call(Request::GetKvsStreamingUrl {
            stream_name: "dock-cam".to_string(),
        })
        .await
        .expect("reply after reconnect");
    assert_eq!(reply.status_code(), 200);
    backend.shutdown();
}

/// With a configured timeout, unanswered calls fail instead of hanging.
#[tokio::test]
async fn calls_time_out_when_configured() {
    let backend = StubBackend::spawn(|_request| Vec::new()).await;
    let options = ChannelConfig {
        reconnect_delay_ms: 50,
        request_timeout_secs: Some(1),
        ..Default::default()
    };
    let channel = ChannelClient::connect(backend.url(), &options);

    let err = channel
        .call(Request::ListS3Videos {
            user_id: "ops".to_string(),
        })
        .await
        .expect_err("timeout");
    match err {
        StreamlensCoreError::Timeout {
            action,
            timeout_secs,
        } => {
            assert_eq!(action, "list_s3_videos");
            assert_eq!(timeout_secs, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    backend.shutdown();
}

/// Closing the channel fails queued callers instead of leaving them hanging.
#[tokio::test]
async fn close_fails_pending_callers() {
    let backend = StubBackend::spawn(|_request| Vec::new()).await;
    let options = ChannelConfig {
        reconnect_delay_ms: 50,
        request_timeout_secs: None,
        ..Default::default()
    };
    let channel = ChannelClient::connect(backend.url(), &options);
    assert!(channel.wait_connected().await);

    let pending = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .call(Request::ListS3Videos {
                    user_id: "ops".to_string(),
                })
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    channel.close().await;

    let err = pending.await.expect("join").expect_err("closed");
    assert!(matches!(err, StreamlensCoreError::ChannelClosed));
    backend.shutdown();
}
