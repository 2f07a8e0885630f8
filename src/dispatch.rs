//! Selection Dispatcher
//!
//! Resolves a selection token from a rendered prompt back to the archived
//! channel message and forwards it to the requester.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, OriginRef, StorageError};
use crate::transport::{ChatTransport, ConversationId, TransportError};

/// Opaque selection token carried by a prompt option; wraps a catalog id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectionToken(pub i64);

impl SelectionToken {
    /// Encode as callback data (decimal id)
    pub fn encode(&self) -> String {
        self.0.to_string()
    }

    /// Decode callback data; anything but a positive decimal id is rejected
    pub fn decode(data: &str) -> Option<Self> {
        if data.is_empty() || !data.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        data.parse::<i64>().ok().filter(|id| *id > 0).map(Self)
    }
}

impl fmt::Display for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Archived message forwarded
    Delivered(OriginRef),
    /// Valid token but no such entry
    Unresolved,
    /// Token was not a catalog id
    Invalid,
}

/// Dispatch failures
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Catalog lookup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Re-delivery failed: {0}")]
    Transport(#[from] TransportError),
}

/// Turns selections into re-deliveries
pub struct SelectionDispatcher {
    catalog: Arc<dyn CatalogStore>,
    transport: Arc<dyn ChatTransport>,
}

impl SelectionDispatcher {
    pub fn new(catalog: Arc<dyn CatalogStore>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { catalog, transport }
    }

    /// Handle a selection event.
    ///
    /// The event is acknowledged before anything else, whatever the token
    /// resolves to. Unknown ids are a silent no-op.
    pub async fn dispatch(
        &self,
        selection_id: &str,
        requester: ConversationId,
        data: Option<&str>,
    ) -> Result<Dispatch, DispatchError> {
        if let Err(e) = self.transport.acknowledge(selection_id).await {
            warn!("Failed to acknowledge selection {}: {}", selection_id, e);
        }

        let Some(token) = data.and_then(SelectionToken::decode) else {
            warn!("Ignoring selection with invalid token: {:?}", data);
            return Ok(Dispatch::Invalid);
        };

        let Some(origin) = self.catalog.resolve(token.0).await? else {
            debug!("Selection {} does not resolve to a catalog entry", token);
            return Ok(Dispatch::Unresolved);
        };

        self.transport.forward(requester, origin).await?;
        info!(
            "Delivered {} (message {} from {}) to chat {}",
            token, origin.message_id, origin.channel_id, requester.0
        );
        Ok(Dispatch::Delivered(origin))
    }
}
