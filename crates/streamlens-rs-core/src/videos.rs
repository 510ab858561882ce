//! Video library operations: listing, upload, playback and live URLs.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use streamlens_rs_protocol::{
    PlaybackUrl, PresignedUpload, Reply, Request, S3Object, StreamingUrl, VideoListing,
};

use crate::channel::{ChannelClient, decode_reply};
use crate::error::StreamlensCoreError;
use crate::http::ApiError;

/// User id of the shared video library.
pub const PUBLIC_LIBRARY_USER: &str = "public";

/// Content type uploaded videos are stored under.
const UPLOAD_CONTENT_TYPE: &str = "video/mp4";

type ListingCall<'a> = Pin<Box<dyn Future<Output = Result<Reply, StreamlensCoreError>> + Send + 'a>>;

/// List the public library and the user's own videos.
///
/// The user listing is requested `stagger` after the public one; results are
/// concatenated in the order the backend answers. Keys whose second path
/// segment is empty (folder markers) are dropped.
pub(crate) async fn list_videos(
    channel: &ChannelClient,
    user_id: &str,
    stagger: Duration,
) -> Result<Vec<S3Object>, StreamlensCoreError> {
    let public_call: ListingCall<'_> = Box::pin(channel.call(Request::ListS3Videos {
        user_id: PUBLIC_LIBRARY_USER.to_string(),
    }));
    let user_call: ListingCall<'_> = {
        let channel = channel.clone();
        let user_id = user_id.to_string();
        Box::pin(async move {
            tokio::time::sleep(stagger).await;
            channel.call(Request::ListS3Videos { user_id }).await
        })
    };

    let mut pending = FuturesUnordered::new();
    pending.push(public_call);
    pending.push(user_call);

    let mut videos = Vec::new();
    while let Some(reply) = pending.next().await {
        let listing: VideoListing = decode_reply("list_s3_videos", &reply?)?;
        videos.extend(
            listing
                .s3_videos
                .into_iter()
                .filter(|object| object.key.split('/').nth(1) != Some("")),
        );
    }
    debug!("listed videos (count={})", videos.len());
    Ok(videos)
}

/// Upload a local video into the user's library.
///
/// The object key is taken from the file name and placed under the user's
/// prefix by the backend; the transfer itself goes through a presigned URL
/// with no request timeout applied.
pub(crate) async fn upload_video(
    channel: &ChannelClient,
    uploader: &reqwest::Client,
    user_id: &str,
    bucket: Option<String>,
    path: &Path,
) -> Result<(), StreamlensCoreError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| StreamlensCoreError::UploadName(path.display().to_string()))?;

    let reply = channel
        .call(Request::GetS3PresignedUrl {
            from_path: file_name.clone(),
            to_path: user_id.to_string(),
            bucket,
        })
        .await?;
    let presigned: PresignedUpload = decode_reply("get_s3_presigned_url", &reply)?;

    let bytes = tokio::fs::read(path).await?;
    info!(
        "uploading video (file={}, bytes={})",
        file_name,
        bytes.len()
    );
    let response = uploader
        .put(&presigned.s3_presigned_url)
        .header(CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
        .body(bytes)
        .send()
        .await
        .map_err(ApiError::Request)?;
    response
        .error_for_status()
        .map_err(ApiError::Request)?;
    Ok(())
}

/// Resolve a presigned playback URL for a stored video.
pub(crate) async fn playback_url(
    channel: &ChannelClient,
    video_object_key: &str,
) -> Result<String, StreamlensCoreError> {
    let reply = channel
        .call(Request::GetS3VideoUrl {
            video_object_key: video_object_key.to_string(),
        })
        .await?;
    let playback: PlaybackUrl = decode_reply("get_s3_video_url", &reply)?;
    Ok(playback.s3_video_url)
}

/// Resolve an HLS playback URL for a live KVS stream.
pub(crate) async fn streaming_url(
    channel: &ChannelClient,
    stream_name: &str,
) -> Result<String, StreamlensCoreError> {
    let reply = channel
        .call(Request::GetKvsStreamingUrl {
            stream_name: stream_name.to_string(),
        })
        .await?;
    let streaming: StreamingUrl = decode_reply("get_kvs_streaming_url", &reply)?;
    Ok(streaming.streaming_url)
}

/// Delete stored analysis artifacts older than `period` days.
///
/// A period of zero deletes everything; negative values are rejected before
/// anything is sent.
pub(crate) async fn delete_resources(
    channel: &ChannelClient,
    user_id: &str,
    period: i64,
) -> Result<String, StreamlensCoreError> {
    if period < 0 {
        return Err(StreamlensCoreError::InvalidPeriod(period));
    }
    let reply = channel
        .call(Request::DeleteResource {
            user_id: user_id.to_string(),
            period,
        })
        .await?;
    let message: String = decode_reply("delete_resource", &reply)?;
    info!("deleted resources (period_days={})", period);
    Ok(message)
}
