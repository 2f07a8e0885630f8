//! Chat Transport Interface
//!
//! The narrow slice of the messaging platform the bot depends on. The
//! Telegram adapter lives in [`crate::telegram`]; tests substitute a
//! recording implementation.

use async_trait::async_trait;

use crate::catalog::OriginRef;
use crate::router::SelectionOption;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Forward failed: {0}")]
    ForwardFailed(String),

    #[error("Acknowledge failed: {0}")]
    AckFailed(String),
}

/// Conversation (chat) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(pub i64);

/// Outbound side of the messaging platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send plain text
    async fn reply(&self, conversation: ConversationId, text: &str) -> Result<(), TransportError>;

    /// Send `text` with one selectable option per catalog match
    async fn render_selection(
        &self,
        conversation: ConversationId,
        text: &str,
        options: &[SelectionOption],
    ) -> Result<(), TransportError>;

    /// Re-deliver an archived message into `conversation`
    async fn forward(&self, conversation: ConversationId, origin: OriginRef) -> Result<(), TransportError>;

    /// Acknowledge a selection event so the client stops waiting
    async fn acknowledge(&self, selection_id: &str) -> Result<(), TransportError>;
}
