use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Client-to-server frames, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// First frame on every connection.
    #[serde(rename = "authenticate")]
    Authenticate { token: String },
    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        sender_id: Uuid,
        receiver_id: Uuid,
        content: String,
    },
}

/// Server-to-client frames, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    /// Delivered to the receiver's live connection.
    #[serde(rename = "messageReceived")]
    MessageReceived { message: Message },
    /// Ack to the sender, emitted only after the message is persisted.
    #[serde(rename = "messageSent")]
    MessageSent { message: Message },
}
