//! Configuration schema for streamlens.

use serde::{Deserialize, Serialize};
use streamlens_rs_protocol::{AnalysisJob, Platform, SourceType};

/// Root config for the streamlens client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamlensConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl StreamlensConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> StreamlensConfigBuilder {
        StreamlensConfigBuilder::new()
    }
}

/// Builder for assembling a `StreamlensConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct StreamlensConfigBuilder {
    config: StreamlensConfig,
}

impl StreamlensConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: StreamlensConfig::default(),
        }
    }

    /// Replace the backend endpoint configuration.
    pub fn endpoints(mut self, endpoints: EndpointsConfig) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Replace the duplex-channel configuration.
    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.config.channel = channel;
        self
    }

    /// Replace the HTTP façade configuration.
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.config.http = http;
        self
    }

    /// Replace the storage configuration.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Replace the analytics-run defaults.
    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.config.analysis = analysis;
        self
    }

    /// Replace the identity configuration.
    pub fn identity(mut self, identity: IdentityConfig) -> Self {
        self.config.identity = identity;
        self
    }

    /// Finalize and return the built `StreamlensConfig`.
    pub fn build(self) -> StreamlensConfig {
        self.config
    }
}

/// Backend endpoints for the duplex channel and the prompt HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    #[serde(default = "default_http_url")]
    pub http_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            websocket_url: default_websocket_url(),
            http_url: default_http_url(),
        }
    }
}

/// Default duplex-channel endpoint.
fn default_websocket_url() -> String {
    "ws://127.0.0.1:8989/ws".to_string()
}

/// Default prompt API endpoint.
fn default_http_url() -> String {
    "http://127.0.0.1:8989".to_string()
}

/// Duplex-channel behavior: reconnect policy, correlation timeouts, and the
/// listing stagger carried over from the original dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// The channel has no request timeout unless one is configured here.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Delay between the public-scoped and user-scoped listing requests.
    /// Backends that echo correlation ids tolerate 0.
    #[serde(default = "default_listing_stagger_ms")]
    pub listing_stagger_ms: u64,
    /// Broadcast buffer for channel events; lagged subscribers skip ahead.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_secs: None,
            listing_stagger_ms: default_listing_stagger_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Default cap on consecutive reconnect attempts.
fn default_reconnect_attempts() -> u32 {
    10
}

/// Default delay between reconnect attempts in milliseconds.
fn default_reconnect_delay_ms() -> u64 {
    1000
}

/// Default stagger between scoped listing requests in milliseconds.
fn default_listing_stagger_ms() -> u64 {
    800
}

/// Default channel event buffer size.
fn default_event_buffer() -> usize {
    256
}

/// HTTP façade behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Default HTTP request timeout in seconds.
fn default_http_timeout_secs() -> u64 {
    30
}

/// Storage targets for uploads and live playback.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Upload bucket; the backend default applies when unset.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Live stream consulted when no stream name is given explicitly.
    #[serde(default)]
    pub stream_name: Option<String>,
}

/// Defaults applied to every analytics run, overridable per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Seconds between inference rounds.
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Frames per inference round.
    #[serde(default = "default_list_length")]
    pub list_length: u32,
    /// Seconds between captured frames.
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// Total run duration in seconds.
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_analysis_platform")]
    pub platform: Platform,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_user_prompt")]
    pub user_prompt: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_tokens: default_max_tokens(),
            frequency: default_frequency(),
            list_length: default_list_length(),
            interval: default_interval(),
            duration: default_duration(),
            image_size: default_image_size(),
            platform: default_analysis_platform(),
            system_prompt: default_system_prompt(),
            user_prompt: default_user_prompt(),
        }
    }
}

impl AnalysisConfig {
    /// Materialize a run request for one video source, applying per-model
    /// input limits.
    pub fn job(
        &self,
        source: SourceType,
        content: impl Into<String>,
        user_id: impl Into<String>,
    ) -> AnalysisJob {
        let mut job = AnalysisJob {
            video_source_type: source,
            video_source_content: content.into(),
            user_id: user_id.into(),
            frequency: self.frequency,
            list_length: self.list_length,
            interval: self.interval,
            image_size: self.image_size.clone(),
            duration: self.duration,
            platform: self.platform,
            system_prompt: self.system_prompt.clone(),
            user_prompt: self.user_prompt.clone(),
            model_id: self.model_id.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
        };
        job.apply_model_limits();
        job
    }
}

/// Default inference model.
fn default_model_id() -> String {
    "anthropic.claude-3-sonnet-20240229-v1:0".to_string()
}

fn default_temperature() -> f64 {
    0.01
}

fn default_top_p() -> f64 {
    1.0
}

fn default_top_k() -> u32 {
    250
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_frequency() -> u32 {
    10
}

fn default_list_length() -> u32 {
    1
}

fn default_interval() -> f64 {
    1.0
}

fn default_duration() -> u32 {
    60
}

/// Default frame resolution; `"raw"` keeps the source resolution.
fn default_image_size() -> String {
    "raw".to_string()
}

fn default_analysis_platform() -> Platform {
    Platform::Lambda
}

/// The dashboard's stock system prompt, kept verbatim.
fn default_system_prompt() -> String {
    "You are a helpful AI assistant.\n<task>\nYou task is to describe the images.\n</task>\n\nAssistant：".to_string()
}

/// The dashboard's stock user prompt, kept verbatim.
fn default_user_prompt() -> String {
    "You have perfect vision and pay great attention to detail which makes you an expert at video monitor.\nBefore answering the question in <answer> tags, please think about it step-by-step within <thinking></thinking> tags".to_string()
}

/// Who requests are issued for.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// User id sent with scoped operations; resolved from the environment
    /// when unset.
    #[serde(default)]
    pub user_id: Option<String>,
}
