//! Channel Ingestion
//!
//! Turns media posts broadcast into the source channel into catalog entries.
//! Only documents and videos with a non-empty caption are indexed; the entry
//! name is the first caption line, trimmed. Everything else is ignored.

use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{CatalogStore, OriginRef, StorageError};

/// Kind of media attached to a broadcast post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Document,
    Video,
    /// Any other media (photo, audio, sticker, ...)
    Other(String),
}

impl Attachment {
    fn is_indexable(&self) -> bool {
        matches!(self, Attachment::Document | Attachment::Video)
    }
}

/// A post observed in a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastPost {
    pub channel_id: i64,
    pub message_id: i32,
    pub attachment: Option<Attachment>,
    pub caption: Option<String>,
}

impl BroadcastPost {
    pub fn origin(&self) -> OriginRef {
        OriginRef::new(self.channel_id, self.message_id)
    }
}

/// Ingestion failure; the post is dropped
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to index post {message_id} from channel {channel_id}: {source}")]
    Storage {
        channel_id: i64,
        message_id: i32,
        #[source]
        source: StorageError,
    },
}

/// Display name for a caption: its first line, trimmed
pub fn extract_name(caption: &str) -> String {
    caption.lines().next().unwrap_or_default().trim().to_string()
}

/// Indexes qualifying posts from a single source channel
pub struct Ingestor {
    catalog: Arc<dyn CatalogStore>,
    source_channel: i64,
}

impl Ingestor {
    pub fn new(catalog: Arc<dyn CatalogStore>, source_channel: i64) -> Self {
        Self {
            catalog,
            source_channel,
        }
    }

    /// Name to index the post under, or `None` if it does not qualify
    pub fn qualifying_name(&self, post: &BroadcastPost) -> Option<String> {
        if post.channel_id != self.source_channel {
            return None;
        }
        if !post.attachment.as_ref().is_some_and(Attachment::is_indexable) {
            return None;
        }
        let caption = post.caption.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(extract_name(caption))
    }

    /// Index a post. Returns the new entry id, or `None` when ignored.
    pub async fn ingest(&self, post: &BroadcastPost) -> Result<Option<i64>, IngestError> {
        let Some(name) = self.qualifying_name(post) else {
            debug!(
                "Ignoring post {} from channel {} (attachment={:?}, caption={})",
                post.message_id,
                post.channel_id,
                post.attachment,
                post.caption.is_some()
            );
            return Ok(None);
        };

        let id = self
            .catalog
            .insert(&name, post.origin())
            .await
            .map_err(|source| IngestError::Storage {
                channel_id: post.channel_id,
                message_id: post.message_id,
                source,
            })?;

        info!("Indexed post {} as #{}: {:?}", post.message_id, id, name);
        Ok(Some(id))
    }
}
