//! Outbound request catalog for the duplex channel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CorrelationId, ProtocolError, TaskId};

/// Image size forced onto llama vision models by the inference backend.
pub const LLAMA_IMAGE_SIZE: &str = "640*480";

/// Every operation a client can request over the channel, tagged by its
/// `action` string on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// List stored videos scoped to one user id (`"public"` for shared ones).
    ListS3Videos { user_id: String },
    /// Negotiate a presigned upload URL. `bucket` falls back to the backend
    /// default when omitted.
    GetS3PresignedUrl {
        from_path: String,
        to_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
    },
    /// Resolve a playback URL for one stored video object.
    GetS3VideoUrl { video_object_key: String },
    /// Resolve a live HLS streaming URL for a named stream.
    GetKvsStreamingUrl { stream_name: String },
    /// Delete a user's stored resources older than `period` days
    /// (0 deletes everything).
    DeleteResource { user_id: String, period: i64 },
    /// Semantic frame retrieval by keyword, optionally bounded in time.
    OpensearchRetrieve {
        user_id: String,
        keyword: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp_start: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp_end: Option<String>,
    },
    /// Visual Q&A over the frames of one finished run.
    VqaChatbot {
        user_id: String,
        task_id: TaskId,
        vqa_prompt: String,
        model: String,
    },
    /// Postprocess agent over one finished run. `execute_times` is advisory;
    /// the backend runs the agent once per request today.
    ConfigureAgent {
        user_id: String,
        task_id: TaskId,
        agent_prompt: String,
        model: String,
        execute_times: u32,
    },
    /// Start an analytics run over a video resource.
    ConfigureVideoResource(AnalysisJob),
}

impl Request {
    /// The wire-level action tag of this request.
    pub fn action(&self) -> &'static str {
        match self {
            Request::ListS3Videos { .. } => "list_s3_videos",
            Request::GetS3PresignedUrl { .. } => "get_s3_presigned_url",
            Request::GetS3VideoUrl { .. } => "get_s3_video_url",
            Request::GetKvsStreamingUrl { .. } => "get_kvs_streaming_url",
            Request::DeleteResource { .. } => "delete_resource",
            Request::OpensearchRetrieve { .. } => "opensearch_retrieve",
            Request::VqaChatbot { .. } => "vqa_chatbot",
            Request::ConfigureAgent { .. } => "configure_agent",
            Request::ConfigureVideoResource(_) => "configure_video_resource",
        }
    }
}

/// Outbound frame: a request plus the correlation id the backend echoes on
/// its reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(flatten)]
    pub request: Request,
    pub correlation_id: CorrelationId,
}

impl RequestEnvelope {
    /// Wrap a request with a freshly generated correlation id.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Serialize to the text frame sent over the channel.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Frame)
    }
}

/// Parameters of one analytics run, flattened into the
/// `configure_video_resource` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub video_source_type: SourceType,
    pub video_source_content: String,
    pub user_id: String,

    /// Seconds between inference rounds.
    pub frequency: u32,
    /// Frames fed into each inference round.
    pub list_length: u32,
    /// Seconds between captured frames.
    pub interval: f64,
    /// Frame resolution fed to the model, `"raw"` or `"W*H"`.
    pub image_size: String,
    /// Total run duration in seconds.
    pub duration: u32,
    pub platform: Platform,

    pub system_prompt: String,
    pub user_prompt: String,
    pub model_id: String,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl AnalysisJob {
    /// Apply per-model input constraints the backend would apply anyway.
    pub fn apply_model_limits(&mut self) {
        if self.model_id.to_lowercase().contains("llama") {
            self.image_size = LLAMA_IMAGE_SIZE.to_string();
        }
    }
}

/// Where a run's video frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A stored video object.
    S3,
    /// A live stream.
    Kvs,
    /// A single stored image.
    S3Image,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::S3 => "s3",
            SourceType::Kvs => "kvs",
            SourceType::S3Image => "s3_image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "s3" => Some(SourceType::S3),
            "kvs" => Some(SourceType::Kvs),
            "s3_image" => Some(SourceType::S3Image),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::parse(s).ok_or_else(|| format!("unknown video source type: {s}"))
    }
}

/// Compute platform the backend extracts frames on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Lambda,
    Ecs,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Lambda => "lambda",
            Platform::Ecs => "ecs",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lambda" => Some(Platform::Lambda),
            "ecs" => Some(Platform::Ecs),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::parse(s).ok_or_else(|| format!("unknown platform: {s}"))
    }
}
