//! Query Router
//!
//! Decides, per free-text query, between catalog presentation and the
//! completion fallback:
//! - catalog hit: up to [`MAX_OPTIONS`] entries offered as a selection prompt
//! - catalog miss: the query goes to the completion backend, answer verbatim
//!
//! The router holds no per-user state; every query is independent.

use std::sync::Arc;
use tracing::debug;

use crate::catalog::{CatalogStore, StorageError};
use crate::completion::{CompletionBackend, CompletionError};
use crate::dispatch::SelectionToken;

/// Maximum number of catalog matches offered for one query
pub const MAX_OPTIONS: usize = 5;

/// Heading of the selection prompt
pub const SELECTION_PROMPT: &str = "🎬 Movies Found:";

/// One selectable catalog match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOption {
    pub label: String,
    pub token: SelectionToken,
}

/// Outcome of routing a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Blank input; nothing was looked up
    Ignored,

    /// Catalog hit
    Selection {
        prompt: String,
        options: Vec<SelectionOption>,
    },

    /// Completion answer for a catalog miss
    Text(String),
}

/// Query failures, mapped to a generic notice at the event boundary
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Catalog lookup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Completion fallback failed: {0}")]
    Completion(#[from] CompletionError),
}

/// Catalog-first query router with completion fallback
pub struct QueryRouter {
    catalog: Arc<dyn CatalogStore>,
    completion: Arc<dyn CompletionBackend>,
}

impl QueryRouter {
    pub fn new(catalog: Arc<dyn CatalogStore>, completion: Arc<dyn CompletionBackend>) -> Self {
        Self {
            catalog,
            completion,
        }
    }

    /// Route one inbound query
    pub async fn route(&self, text: &str) -> Result<Reply, QueryError> {
        let query = text.trim();
        // Never let a blank query reach the store: it would list everything
        if query.is_empty() {
            return Ok(Reply::Ignored);
        }

        let matches = self.catalog.search(query).await?;
        debug!("Catalog search {:?}: {} match(es)", query, matches.len());

        if !matches.is_empty() {
            let options = matches
                .into_iter()
                .take(MAX_OPTIONS)
                .map(|entry| SelectionOption {
                    label: entry.name,
                    token: SelectionToken(entry.id),
                })
                .collect();

            return Ok(Reply::Selection {
                prompt: SELECTION_PROMPT.to_string(),
                options,
            });
        }

        let answer = self.completion.complete(query).await?;
        Ok(Reply::Text(answer))
    }
}
