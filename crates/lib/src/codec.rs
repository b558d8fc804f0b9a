//! Direct Line wire types and the activity codec.
//!
//! Outgoing activities are serialized field-for-field; inbound bodies are decoded into
//! an ordered [`ActivityBatch`]. Unknown inbound fields are ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed activity json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("response has no `activities` array")]
    MissingActivities,
}

/// Activity type on the wire: `message`, `conversationUpdate`; anything else decodes as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    Message,
    ConversationUpdate,
    #[serde(other)]
    Unknown,
}

/// `from` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `conversation` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
}

/// Outgoing activity: `{ from:{id,name}, conversation:{id}, text, type, channelId }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub from: ChannelAccount,
    pub conversation: ConversationAccount,
    pub text: String,
    #[serde(rename = "type")]
    pub typ: ActivityType,
    pub channel_id: String,
}

impl Activity {
    pub fn new(
        from: ChannelAccount,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
        typ: ActivityType,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            from,
            conversation: ConversationAccount {
                id: conversation_id.into(),
            },
            text: text.into(),
            typ,
            channel_id: channel_id.into(),
        }
    }
}

/// One activity as returned by a poll. Everything but `text` is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<ActivityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Poll response: `{ activities: [...], watermark? }`, in service order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityBatch {
    pub activities: Vec<InboundActivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
}

impl ActivityBatch {
    /// Reply texts in order; activities without text are skipped.
    pub fn texts(&self) -> Vec<&str> {
        self.activities
            .iter()
            .filter_map(|a| a.text.as_deref())
            .collect()
    }
}

/// `POST /conversations` response; `token`, `expires_in` and `streamUrl` are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub conversation_id: String,
}

/// `POST .../activities` acknowledgement: `{ "id": "<conversationId>|0000001" }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceResponse {
    #[serde(default)]
    pub id: Option<String>,
}

pub fn encode(activity: &Activity) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(activity)?)
}

pub fn encode_batch(batch: &ActivityBatch) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(batch)?)
}

/// Decode a poll body. A body without an `activities` array is an error, never an empty batch.
pub fn decode(bytes: &[u8]) -> Result<ActivityBatch, CodecError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    match value.get("activities") {
        Some(serde_json::Value::Array(_)) => Ok(serde_json::from_value(value)?),
        _ => Err(CodecError::MissingActivities),
    }
}

pub fn decode_conversation(bytes: &[u8]) -> Result<ConversationResponse, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Empty acknowledgement bodies are accepted (no id).
pub fn decode_resource(bytes: &[u8]) -> Result<ResourceResponse, CodecError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(ResourceResponse { id: None });
    }
    Ok(serde_json::from_slice(bytes)?)
}
