//! Semantic search over analyzed frames.

use log::debug;
use streamlens_rs_protocol::{Request, RetrievedFrame};

use crate::channel::{ChannelClient, decode_reply};
use crate::error::StreamlensCoreError;

/// Search indexed frame descriptions by keyword.
///
/// Both bounds of the optional timestamp window are forwarded only when set;
/// the backend returns matches ordered by relevance score.
pub(crate) async fn search_frames(
    channel: &ChannelClient,
    user_id: &str,
    keyword: &str,
    timestamp_start: Option<String>,
    timestamp_end: Option<String>,
) -> Result<Vec<RetrievedFrame>, StreamlensCoreError> {
    let reply = channel
        .call(Request::OpensearchRetrieve {
            user_id: user_id.to_string(),
            keyword: keyword.to_string(),
            timestamp_start,
            timestamp_end,
        })
        .await?;
    let frames: Vec<RetrievedFrame> = decode_reply("opensearch_retrieve", &reply)?;
    debug!("retrieved frames (keyword={}, count={})", keyword, frames.len());
    Ok(frames)
}
