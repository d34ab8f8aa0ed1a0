//! Gmail `users.messages` resources reshaped into [`EmailMessage`].

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};

/// Gmail emits base64url with or without padding depending on the field.
pub(crate) const GMAIL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STARRED_LABEL: &str = "STARRED";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    pub attachment_id: Option<String>,
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipients: String,
    pub body: String,
    pub snippet: String,
    pub has_attachments: bool,
    pub date: String,
    pub starred: bool,
    pub labels: Vec<String>,
}

impl From<RawMessage> for EmailMessage {
    fn from(raw: RawMessage) -> Self {
        let payload = raw.payload.unwrap_or_default();
        let header = |canonical: &str| header_value(&payload.headers, canonical);

        Self {
            subject: header("Subject"),
            sender: header("From"),
            recipients: header("To"),
            date: header("Date"),
            body: body_text(&payload),
            has_attachments: has_attachments(&payload),
            starred: raw.label_ids.iter().any(|label| label == STARRED_LABEL),
            id: raw.id,
            thread_id: raw.thread_id,
            snippet: raw.snippet,
            labels: raw.label_ids,
        }
    }
}

/// First header named exactly `canonical` or its lowercase spelling.
fn header_value(headers: &[Header], canonical: &str) -> String {
    let lowercase = canonical.to_ascii_lowercase();
    headers
        .iter()
        .find(|header| header.name == canonical || header.name == lowercase)
        .map(|header| header.value.clone())
        .unwrap_or_default()
}

fn body_text(payload: &MessagePart) -> String {
    if payload.parts.is_empty() {
        return decode_data(payload.body.data.as_deref());
    }

    first_plain_part(&payload.parts)
        .map(|part| decode_data(part.body.data.as_deref()))
        .unwrap_or_default()
}

fn first_plain_part(parts: &[MessagePart]) -> Option<&MessagePart> {
    parts.iter().find_map(|part| {
        if part.mime_type == "text/plain" && part.body.attachment_id.is_none() {
            Some(part)
        } else {
            first_plain_part(&part.parts)
        }
    })
}

fn has_attachments(part: &MessagePart) -> bool {
    part.parts
        .iter()
        .any(|child| child.body.attachment_id.is_some() || has_attachments(child))
}

fn decode_data(data: Option<&str>) -> String {
    let Some(data) = data else {
        return String::new();
    };

    match GMAIL_BASE64.decode(data.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::debug!(error = %err, "undecodable message body");
            String::new()
        }
    }
}
