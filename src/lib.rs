//! ReelFinder
//!
//! Telegram bot that indexes media posted to an archive channel and serves
//! it back on request, with an LLM answer when nothing in the catalog matches.
//!
//! # Architecture
//!
//! ```text
//! channel post ──► Ingestor ──► Catalog (SQLite)
//!                                  ▲
//! text query ───► QueryRouter ─────┤──(miss)──► Completion (Groq)
//!                     │            │
//!                     ▼            │
//!              selection prompt    │
//!                     │            │
//! button press ─► SelectionDispatcher ──► forward archived message
//! ```

pub mod catalog;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod ingest;
pub mod router;
pub mod telegram;
pub mod transport;

pub use catalog::{CatalogEntry, CatalogStore, OriginRef, SqliteCatalog, StorageError};
pub use completion::{CompletionBackend, CompletionError, GroqClient};
pub use config::{Config, ConfigError};
pub use dispatch::{Dispatch, DispatchError, SelectionDispatcher, SelectionToken};
pub use events::{EventHandler, InboundEvent, FAILURE_NOTICE};
pub use ingest::{Attachment, BroadcastPost, IngestError, Ingestor};
pub use router::{QueryError, QueryRouter, Reply, SelectionOption, MAX_OPTIONS};
pub use transport::{ChatTransport, ConversationId, TransportError};
