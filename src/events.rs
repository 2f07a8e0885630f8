//! Inbound Events
//!
//! Every update the bot reacts to is one of three variants, handled
//! exhaustively here. This is also the only place where internal errors are
//! turned into the generic notice users see.

use std::sync::Arc;
use tracing::{error, warn};

use crate::catalog::CatalogStore;
use crate::completion::CompletionBackend;
use crate::dispatch::{DispatchError, SelectionDispatcher};
use crate::ingest::{BroadcastPost, Ingestor};
use crate::router::{QueryRouter, Reply};
use crate::transport::{ChatTransport, ConversationId, TransportError};

/// Reply sent whenever a query or selection fails internally
pub const FAILURE_NOTICE: &str = "⚠️ Something went wrong, please try again later.";

/// Normalized inbound update
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Post in a broadcast channel
    Broadcast(BroadcastPost),

    /// Free-text message from a user
    TextQuery {
        conversation: ConversationId,
        text: String,
    },

    /// Option chosen from a selection prompt
    Selection {
        selection_id: String,
        conversation: ConversationId,
        token: Option<String>,
    },
}

/// Wires the ingestion, routing and dispatch paths to one transport
pub struct EventHandler {
    ingestor: Ingestor,
    router: QueryRouter,
    dispatcher: SelectionDispatcher,
    transport: Arc<dyn ChatTransport>,
}

impl EventHandler {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        completion: Arc<dyn CompletionBackend>,
        transport: Arc<dyn ChatTransport>,
        source_channel: i64,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(Arc::clone(&catalog), source_channel),
            router: QueryRouter::new(Arc::clone(&catalog), completion),
            dispatcher: SelectionDispatcher::new(catalog, Arc::clone(&transport)),
            transport,
        }
    }

    /// Handle one event. Only failures to talk back to the user surface here.
    pub async fn handle(&self, event: InboundEvent) -> Result<(), TransportError> {
        match event {
            InboundEvent::Broadcast(post) => {
                // Dropped on failure; no retry
                if let Err(e) = self.ingestor.ingest(&post).await {
                    error!("{}", e);
                }
                Ok(())
            }

            InboundEvent::TextQuery { conversation, text } => match self.router.route(&text).await {
                Ok(Reply::Ignored) => Ok(()),
                Ok(Reply::Selection { prompt, options }) => {
                    self.transport
                        .render_selection(conversation, &prompt, &options)
                        .await
                }
                Ok(Reply::Text(answer)) => self.transport.reply(conversation, &answer).await,
                Err(e) => {
                    error!("Query from chat {} failed: {}", conversation.0, e);
                    self.transport.reply(conversation, FAILURE_NOTICE).await
                }
            },

            InboundEvent::Selection {
                selection_id,
                conversation,
                token,
            } => match self
                .dispatcher
                .dispatch(&selection_id, conversation, token.as_deref())
                .await
            {
                Ok(_) => Ok(()),
                Err(DispatchError::Storage(e)) => {
                    error!("Selection lookup for chat {} failed: {}", conversation.0, e);
                    self.transport.reply(conversation, FAILURE_NOTICE).await
                }
                Err(DispatchError::Transport(e)) => {
                    warn!("Re-delivery to chat {} failed: {}", conversation.0, e);
                    Err(e)
                }
            },
        }
    }
}
