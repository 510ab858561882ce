//! Client facade composing the channel, run aggregation, and the prompt API.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use streamlens_rs_config::StreamlensConfig;
use streamlens_rs_protocol::{Request, RetrievedFrame, S3Object, SourceType};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::analysis::{RunHandle, RunRegistry};
use crate::channel::{ChannelClient, ChannelEvent, decode_reply};
use crate::chat::ChatSession;
use crate::error::StreamlensCoreError;
use crate::http::{ApiError, PromptApi};
use crate::{retrieval, videos};

/// One dashboard session against a streams backend.
///
/// Owns the websocket channel, keeps run state up to date from pushes, and
/// exposes every operation the dashboard offers. Cheap to clone through the
/// shared channel; construct once per backend.
pub struct Dashboard {
    config: StreamlensConfig,
    user_id: String,
    channel: ChannelClient,
    runs: Arc<RunRegistry>,
    prompts: PromptApi,
    uploader: reqwest::Client,
    consumer: JoinHandle<()>,
}

impl Dashboard {
    /// Connect to the backend named by `config` on behalf of `user_id`.
    ///
    /// The websocket comes up in the background; operations issued before the
    /// first session is live are queued and flushed in order.
    pub fn new(
        config: StreamlensConfig,
        user_id: impl Into<String>,
    ) -> Result<Self, StreamlensCoreError> {
        let user_id = user_id.into();
        let channel = ChannelClient::connect(&config.endpoints.websocket_url, &config.channel);
        let prompts = PromptApi::new(&config.endpoints.http_url, &config.http)?;
        // Uploads stream through presigned URLs; no overall timeout.
        let uploader = reqwest::Client::builder().build().map_err(ApiError::Request)?;

        let runs = Arc::new(RunRegistry::new());
        let consumer = tokio::spawn(consume_notifications(channel.events(), runs.clone()));

        info!(
            "dashboard ready (user_id={}, websocket_url={})",
            user_id, config.endpoints.websocket_url
        );
        Ok(Self {
            config,
            user_id,
            channel,
            runs,
            prompts,
            uploader,
            consumer,
        })
    }

    /// The resolved user this session acts as.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The configuration this session was built from.
    pub fn config(&self) -> &StreamlensConfig {
        &self.config
    }

    /// Direct access to the underlying channel.
    pub fn channel(&self) -> &ChannelClient {
        &self.channel
    }

    /// Direct access to the prompt template API.
    pub fn prompts(&self) -> &PromptApi {
        &self.prompts
    }

    /// Whether the websocket session is currently live.
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Watch the connection flag for changes.
    pub fn connected_watch(&self) -> watch::Receiver<bool> {
        self.channel.connected_watch()
    }

    /// Wait until the websocket session is live.
    pub async fn wait_connected(&self) -> bool {
        self.channel.wait_connected().await
    }

    /// Subscribe to raw channel events.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.channel.events()
    }

    /// List the public library and this user's videos.
    pub async fn list_videos(&self) -> Result<Vec<S3Object>, StreamlensCoreError> {
        let stagger = Duration::from_millis(self.config.channel.listing_stagger_ms);
        videos::list_videos(&self.channel, &self.user_id, stagger).await
    }

    /// Upload a local video into this user's library.
    pub async fn upload_video(&self, path: &Path) -> Result<(), StreamlensCoreError> {
        videos::upload_video(
            &self.channel,
            &self.uploader,
            &self.user_id,
            self.config.storage.bucket.clone(),
            path,
        )
        .await
    }

    /// Resolve a presigned playback URL for a stored video.
    pub async fn playback_url(&self, video_object_key: &str) -> Result<String, StreamlensCoreError> {
        videos::playback_url(&self.channel, video_object_key).await
    }

    /// Resolve an HLS playback URL for a live KVS stream.
    pub async fn streaming_url(&self, stream_name: &str) -> Result<String, StreamlensCoreError> {
        videos::streaming_url(&self.channel, stream_name).await
    }

    /// Delete stored analysis artifacts older than `period` days; zero
    /// deletes everything.
    pub async fn delete_resources(&self, period: i64) -> Result<String, StreamlensCoreError> {
        videos::delete_resources(&self.channel, &self.user_id, period).await
    }

    /// Search indexed frame descriptions by keyword, optionally bounded to a
    /// timestamp window.
    pub async fn search_frames(
        &self,
        keyword: &str,
        timestamp_start: Option<String>,
        timestamp_end: Option<String>,
    ) -> Result<Vec<RetrievedFrame>, StreamlensCoreError> {
        retrieval::search_frames(
            &self.channel,
            &self.user_id,
            keyword,
            timestamp_start,
            timestamp_end,
        )
        .await
    }

    /// Start analyzing a video source and return a view of the new run.
    ///
    /// The job submission is fire-and-forget; progress arrives as pushes and
    /// is readable through the returned [`RunHandle`].
    pub fn start_analysis(
        &self,
        source: SourceType,
        content: impl Into<String>,
    ) -> Result<RunHandle, StreamlensCoreError> {
        let job = self.config.analysis.job(source, content, self.user_id.as_str());
        debug!(
            "submitting analysis job (source={}, model_id={})",
            job.video_source_type, job.model_id
        );
        self.channel.send(Request::ConfigureVideoResource(job))?;
        Ok(self.runs.begin())
    }

    /// Open a chat session over a finished run.
    ///
    /// The task id only becomes known when the run's end marker arrives, so
    /// this fails with [`StreamlensCoreError::RunNotReady`] until then.
    pub fn session_for(&self, run: &RunHandle) -> Result<ChatSession, StreamlensCoreError> {
        let task_id = run.task_id().ok_or(StreamlensCoreError::RunNotReady)?;
        Ok(ChatSession::new(task_id))
    }

    /// Ask a follow-up question about a finished run.
    ///
    /// The question and its answer are recorded in `session`; an answer that
    /// repeats the previous message is returned but not re-recorded.
    pub async fn ask(
        &self,
        session: &mut ChatSession,
        question: &str,
    ) -> Result<String, StreamlensCoreError> {
        session.record_user(question);
        let reply = self
            .channel
            .call(Request::VqaChatbot {
                user_id: self.user_id.clone(),
                task_id: session.task_id().to_string(),
                vqa_prompt: question.to_string(),
                model: self.config.analysis.model_id.clone(),
            })
            .await?;
        let answer: streamlens_rs_protocol::VqaReply = decode_reply("vqa_chatbot", &reply)?;
        session.record_assistant(&answer.vqa_result);
        Ok(answer.vqa_result)
    }

    /// Run a post-processing agent over the run behind `handle`.
    ///
    /// Fails with [`StreamlensCoreError::RunNotReady`] until the run's end
    /// marker has reported a task id.
    pub async fn run_agent_for(
        &self,
        run: &RunHandle,
        agent_prompt: &str,
        execute_times: u32,
    ) -> Result<Option<String>, StreamlensCoreError> {
        let task_id = run.task_id().ok_or(StreamlensCoreError::RunNotReady)?;
        self.run_agent(&task_id, agent_prompt, execute_times).await
    }

    /// Run a post-processing agent over a finished run's outputs.
    pub async fn run_agent(
        &self,
        task_id: &str,
        agent_prompt: &str,
        execute_times: u32,
    ) -> Result<Option<String>, StreamlensCoreError> {
        let reply = self
            .channel
            .call(Request::ConfigureAgent {
                user_id: self.user_id.clone(),
                task_id: task_id.to_string(),
                agent_prompt: agent_prompt.to_string(),
                model: self.config.analysis.model_id.clone(),
                execute_times,
            })
            .await?;
        let agent: streamlens_rs_protocol::AgentReply = decode_reply("configure_agent", &reply)?;
        Ok(agent.agent_result)
    }

    /// Close the channel and stop the push consumer.
    pub async fn close(self) {
        self.channel.close().await;
        self.consumer.abort();
        let _ = self.consumer.await;
    }
}

/// Feed push notifications from the channel into the run registry.
async fn consume_notifications(
    mut events: broadcast::Receiver<ChannelEvent>,
    runs: Arc<RunRegistry>,
) {
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Notification(notification)) => runs.ingest(notification),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("push consumer lagged (skipped={})", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("push consumer stopped");
}
