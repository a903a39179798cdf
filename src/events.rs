use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound platform update addressed to a tenant bot. Dispatch treats the
/// payload as opaque; individual modules know how to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl InboundEvent {
    pub fn text_message(chat_id: i64, sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender_id,
            text: Some(text.into()),
            payload: Value::Null,
        }
    }
}
