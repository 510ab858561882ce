//! Builders for the wire shapes the streams backend produces.

use serde_json::{Value, json};

/// Reply whose body is a JSON-encoded string, the common backend shape.
pub fn reply(action: &str, status: u16, body: &Value) -> Value {
    json!({ "action": action, "statusCode": status, "body": body.to_string() })
}

/// Reply whose body is raw JSON, as the retrieval path produces.
pub fn reply_raw_body(action: &str, status: u16, body: Value) -> Value {
    json!({ "action": action, "statusCode": status, "body": body })
}

/// Failure reply with no action tag, as error paths produce.
pub fn error_reply(status: u16, message: &str) -> Value {
    json!({ "statusCode": status, "body": message })
}

/// Copy the correlation id from a request onto a reply, when present.
pub fn with_correlation(mut reply: Value, request: &Value) -> Value {
    if let (Some(map), Some(correlation_id)) = (reply.as_object_mut(), request.get("correlation_id"))
    {
        map.insert("correlation_id".to_string(), correlation_id.clone());
    }
    reply
}

/// Push carrying one analyzed frame.
pub fn notify_frame(task_id: &str, timestamp: &str, img_url: &str, analysis_result: &str) -> Value {
    json!({
        "action": "websocket_notify",
        "timestamp": timestamp,
        "img_url": img_url,
        "analysis_result": analysis_result,
        "task_id": task_id,
    })
}

/// Push marking the end of a run's frame stream.
pub fn notify_end(task_id: &str) -> Value {
    json!({
        "action": "websocket_notify",
        "timestamp": "end",
        "img_url": "",
        "analysis_result": "",
        "task_id": task_id,
        "tag": "end",
    })
}

/// Push carrying the run summary.
pub fn notify_summary(summary_result: &str) -> Value {
    json!({
        "action": "websocket_notify",
        "summary_result": summary_result,
    })
}
