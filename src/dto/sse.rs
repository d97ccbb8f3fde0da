use serde::Serialize;

use crate::dto::ws::OutboundMessage;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Mirror a room broadcast, named after its message type.
    pub fn from_outbound(message: &OutboundMessage) -> serde_json::Result<Self> {
        Self::json(Some(message.kind().to_string()), message)
    }
}
