//! Wire protocol for the streamlens duplex channel: envelopes, the request
//! catalog, push-notification payloads, and typed reply bodies.

mod request;

pub use request::{
    AnalysisJob, LLAMA_IMAGE_SIZE, Platform, Request, RequestEnvelope, SourceType,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Backend-assigned identifier of one analytics run.
pub type TaskId = String;
/// Client-generated id echoed by the backend to bind a reply to its request.
pub type CorrelationId = Uuid;

/// Action tag the backend injects into every server push.
pub const PUSH_ACTION: &str = "websocket_notify";
/// Wire value of a successful `statusCode`.
pub const STATUS_OK: u16 = 200;

/// Errors raised while encoding or decoding channel frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON document of the expected envelope shape.
    #[error("malformed channel frame: {0}")]
    Frame(serde_json::Error),
    /// The reply body did not match the shape its action promises.
    #[error("reply body did not match the expected shape: {0}")]
    Body(serde_json::Error),
    /// The reply carried no body at all.
    #[error("reply carried no body")]
    MissingBody,
}

/// One classified inbound frame: either a reply to some request or an
/// unsolicited server push.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply(Reply),
    Push(Notification),
}

impl Inbound {
    /// Parse and classify a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::Frame)?;
        Self::classify(value)
    }

    /// Classify an already-parsed frame. Pushes are recognized by their
    /// injected action tag; everything else is treated as a reply, including
    /// backend error envelopes that omit `action` entirely.
    pub fn classify(value: Value) -> Result<Self, ProtocolError> {
        let is_push = value
            .get("action")
            .and_then(Value::as_str)
            .is_some_and(|action| action == PUSH_ACTION);
        if is_push {
            let notification = serde_json::from_value(value).map_err(ProtocolError::Frame)?;
            Ok(Inbound::Push(notification))
        } else {
            let reply = serde_json::from_value(value).map_err(ProtocolError::Frame)?;
            Ok(Inbound::Reply(reply))
        }
    }
}

/// Reply envelope. `statusCode` follows HTTP conventions even though the
/// transport is not HTTP; error replies routinely omit `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(
        default,
        rename = "statusCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl Reply {
    /// Whether the backend reported success.
    pub fn ok(&self) -> bool {
        self.status == Some(STATUS_OK)
    }

    /// The reported status code, 0 when the envelope carried none.
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(0)
    }

    /// Decode the body into its action-specific shape. Most operations
    /// double-encode the body as a JSON string; retrieval sends a raw array.
    /// Both forms are accepted.
    pub fn decode_body<T>(&self) -> Result<T, ProtocolError>
    where
        T: serde::de::DeserializeOwned,
    {
        match &self.body {
            None => Err(ProtocolError::MissingBody),
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(ProtocolError::Body),
            Some(value) => serde_json::from_value(value.clone()).map_err(ProtocolError::Body),
        }
    }

    /// Best-effort human-readable message out of an error reply. Backends
    /// here answer with a bare string, a JSON-encoded string, or a
    /// `{"error": ...}` document depending on the operation.
    pub fn error_message(&self) -> String {
        fn from_object(value: &Value) -> Option<String> {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        }

        match &self.body {
            None => String::new(),
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::String(inner)) => inner,
                Ok(parsed) => from_object(&parsed).unwrap_or_else(|| raw.clone()),
                Err(_) => raw.clone(),
            },
            Some(value) => from_object(value).unwrap_or_else(|| value.to_string()),
        }
    }
}

/// Server-push payloads, distinguished by field presence the way the
/// original consumers did: a summary wins over a per-frame result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    Summary(RunSummary),
    Frame(FrameAnalysis),
}

/// Terminal summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub summary_result: String,
}

/// One analyzed frame streamed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub timestamp: String,
    pub img_url: String,
    pub analysis_result: String,
    pub task_id: TaskId,
    /// `"end"` on the final frame of a run, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FrameAnalysis {
    /// Whether this frame closes its run.
    pub fn is_end(&self) -> bool {
        self.tag.as_deref() == Some("end")
    }
}

/// Body of a successful `list_s3_videos` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoListing {
    pub s3_videos: Vec<S3Object>,
}

/// Stored video object, with the storage service's own key casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Object {
    pub key: String,
    /// Stringified timestamp, e.g. `"2024-08-13 06:12:39+00:00"`.
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    /// Object size in bytes.
    pub size: u64,
    pub storage_class: String,
}

/// Body of a successful `get_s3_presigned_url` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresignedUpload {
    pub s3_presigned_url: String,
}

/// Body of a successful `get_s3_video_url` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackUrl {
    pub s3_video_url: String,
}

/// Body of a successful `get_kvs_streaming_url` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingUrl {
    pub streaming_url: String,
}

/// Body of a successful `vqa_chatbot` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VqaReply {
    pub vqa_result: String,
}

/// Body of a successful `configure_agent` reply. The agent may come back
/// empty-handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(default)]
    pub agent_result: Option<String>,
}

/// One hit of an `opensearch_retrieve` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFrame {
    pub image_url: String,
    pub description: String,
    pub timestamp: String,
    pub video_resource: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_envelope_carries_action_tag_and_correlation_id() {
        let envelope = RequestEnvelope::new(Request::ListS3Videos {
            user_id: "public".to_string(),
        });
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["action"], json!("list_s3_videos"));
        assert_eq!(value["user_id"], json!("public"));
        assert!(value["correlation_id"].is_string());
    }

    #[test]
    fn analysis_job_flattens_into_the_tagged_request() {
        let mut job = AnalysisJob {
            video_source_type: SourceType::S3,
            video_source_content: "alice/door-bell.mp4".to_string(),
            user_id: "alice".to_string(),
            frequency: 10,
            list_length: 1,
            interval: 1.0,
            image_size: "raw".to_string(),
            duration: 60,
            platform: Platform::Lambda,
            system_prompt: "sys".to_string(),
            user_prompt: "user".to_string(),
            model_id: "us.meta.llama3-2-90b-instruct-v1:0".to_string(),
            temperature: 0.01,
            top_p: 1.0,
            top_k: 250,
            max_tokens: 2048,
        };
        job.apply_model_limits();
        assert_eq!(job.image_size, LLAMA_IMAGE_SIZE);

        let value =
            serde_json::to_value(Request::ConfigureVideoResource(job)).expect("serialize");
        assert_eq!(value["action"], json!("configure_video_resource"));
        assert_eq!(value["video_source_type"], json!("s3"));
        assert_eq!(value["platform"], json!("lambda"));
        assert_eq!(value["top_k"], json!(250));
    }

    #[test]
    fn classifies_pushes_by_injected_action() {
        let frame = Inbound::parse(
            r#"{"timestamp":"00:10","img_url":"https://img","analysis_result":"a dog",
                "task_id":"t-1","action":"websocket_notify"}"#,
        )
        .expect("parse");
        match frame {
            Inbound::Push(Notification::Frame(frame)) => {
                assert_eq!(frame.timestamp, "00:10");
                assert!(!frame.is_end());
            }
            other => panic!("expected frame push, got {other:?}"),
        }

        let summary = Inbound::parse(
            r#"{"summary_result":"all quiet","action":"websocket_notify"}"#,
        )
        .expect("parse");
        assert_eq!(
            summary,
            Inbound::Push(Notification::Summary(RunSummary {
                summary_result: "all quiet".to_string(),
            }))
        );
    }

    #[test]
    fn end_tag_closes_a_run() {
        let parsed = Inbound::parse(
            r#"{"timestamp":"00:59","img_url":"u","analysis_result":"r",
                "task_id":"t-9","tag":"end","action":"websocket_notify"}"#,
        )
        .expect("parse");
        match parsed {
            Inbound::Push(Notification::Frame(frame)) => assert!(frame.is_end()),
            other => panic!("expected frame push, got {other:?}"),
        }
    }

    #[test]
    fn reply_without_action_still_classifies() {
        let parsed = Inbound::parse(r#"{"statusCode":500,"body":"Failed to run lambda"}"#)
            .expect("parse");
        match parsed {
            Inbound::Reply(reply) => {
                assert!(!reply.ok());
                assert_eq!(reply.action, None);
                assert_eq!(reply.error_message(), "Failed to run lambda");
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn decodes_double_encoded_bodies() {
        let reply = Reply {
            action: Some("get_s3_video_url".to_string()),
            status: Some(200),
            body: Some(json!("{\"s3_video_url\":\"https://bucket/key\"}")),
            correlation_id: None,
        };
        let decoded: PlaybackUrl = reply.decode_body().expect("decode");
        assert_eq!(decoded.s3_video_url, "https://bucket/key");
    }

    #[test]
    fn decodes_raw_array_bodies() {
        let reply = Reply {
            action: Some("opensearch_retrieve".to_string()),
            status: Some(200),
            body: Some(json!([{
                "image_url": "https://img",
                "description": "a red truck",
                "timestamp": "2024-08-13 06:12:39",
                "video_resource": "alice/dock.mp4",
                "score": 0.83
            }])),
            correlation_id: None,
        };
        let decoded: Vec<RetrievedFrame> = reply.decode_body().expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].description, "a red truck");
    }

    #[test]
    fn error_message_unwraps_every_backend_shape() {
        let bare = Reply {
            action: None,
            status: Some(400),
            body: Some(json!("Missing user_id in request")),
            correlation_id: None,
        };
        assert_eq!(bare.error_message(), "Missing user_id in request");

        let encoded_object = Reply {
            action: None,
            status: Some(500),
            body: Some(json!("{\"error\":\"index not found\"}")),
            correlation_id: None,
        };
        assert_eq!(encoded_object.error_message(), "index not found");

        let encoded_string = Reply {
            action: Some("delete_resource".to_string()),
            status: Some(200),
            body: Some(json!("\"Deletion process completed successfully\"")),
            correlation_id: None,
        };
        assert_eq!(
            encoded_string.error_message(),
            "Deletion process completed successfully"
        );
    }

    #[test]
    fn s3_objects_use_the_storage_service_casing() {
        let listing: VideoListing = serde_json::from_str(
            r#"{"s3_videos":[{"Key":"public/door-bell.mp4",
                "LastModified":"2024-08-13 06:12:39+00:00",
                "ETag":"\"654109\"","Size":9851118,"StorageClass":"STANDARD"}]}"#,
        )
        .expect("decode");
        assert_eq!(listing.s3_videos[0].key, "public/door-bell.mp4");
        assert_eq!(listing.s3_videos[0].size, 9851118);

        let round = serde_json::to_value(&listing.s3_videos[0]).expect("serialize");
        assert_eq!(round["Key"], json!("public/door-bell.mp4"));
        assert_eq!(round["ETag"], json!("\"654109\""));
    }
}
