//! Telegram integration for ReelFinder
//!
//! Maps teloxide updates onto [`InboundEvent`]s and implements
//! [`ChatTransport`] on top of the Bot API:
//! - channel posts feed the catalog
//! - private/group text messages are routed as queries
//! - inline keyboard presses are selections
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, Update},
};

use crate::catalog::{CatalogStore, OriginRef, SqliteCatalog};
use crate::completion::GroqClient;
use crate::config::Config;
use crate::events::{EventHandler, InboundEvent};
use crate::ingest::{Attachment, BroadcastPost};
use crate::router::SelectionOption;
use crate::transport::{ChatTransport, ConversationId, TransportError};

/// Longest text chunk sent in one message (Bot API cap is 4096)
const MAX_MESSAGE_CHARS: usize = 4000;

/// Bot API transport
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Split text into chunks of at most `max_chars` characters
fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest;
    }
    chunks
}

/// Button text for an option; Telegram rejects empty labels
fn button_label(option: &SelectionOption) -> String {
    if option.label.trim().is_empty() {
        format!("Untitled {}", option.token)
    } else {
        option.label.clone()
    }
}

/// One button per row, callback data is the encoded token
fn selection_keyboard(options: &[SelectionOption]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .map(|option| {
            vec![InlineKeyboardButton::callback(
                button_label(option),
                option.token.encode(),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn reply(&self, conversation: ConversationId, text: &str) -> Result<(), TransportError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.bot
                .send_message(ChatId(conversation.0), chunk)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn render_selection(
        &self,
        conversation: ConversationId,
        text: &str,
        options: &[SelectionOption],
    ) -> Result<(), TransportError> {
        self.bot
            .send_message(ChatId(conversation.0), text)
            .reply_markup(selection_keyboard(options))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn forward(&self, conversation: ConversationId, origin: OriginRef) -> Result<(), TransportError> {
        self.bot
            .forward_message(
                ChatId(conversation.0),
                ChatId(origin.channel_id),
                MessageId(origin.message_id),
            )
            .await
            .map_err(|e| TransportError::ForwardFailed(e.to_string()))?;
        Ok(())
    }

    async fn acknowledge(&self, selection_id: &str) -> Result<(), TransportError> {
        self.bot
            .answer_callback_query(selection_id.to_string())
            .await
            .map_err(|e| TransportError::AckFailed(e.to_string()))?;
        Ok(())
    }
}

/// Which media fields a channel post carries
#[derive(Debug, Default, Clone, Copy)]
struct MediaFlags {
    document: bool,
    video: bool,
    animation: bool,
    photo: bool,
    audio: bool,
}

impl MediaFlags {
    fn of(msg: &Message) -> Self {
        Self {
            document: msg.document().is_some(),
            video: msg.video().is_some(),
            animation: msg.animation().is_some(),
            photo: msg.photo().is_some(),
            audio: msg.audio().is_some(),
        }
    }

    /// Bot API sends GIFs and soundless clips as `animation` alongside a
    /// `document` copy; teloxide keeps only the animation, so it counts as one.
    fn attachment(self) -> Option<Attachment> {
        if self.document || self.animation {
            Some(Attachment::Document)
        } else if self.video {
            Some(Attachment::Video)
        } else if self.photo {
            Some(Attachment::Other("photo".to_string()))
        } else if self.audio {
            Some(Attachment::Other("audio".to_string()))
        } else {
            None
        }
    }
}

/// Media kind of a channel post, if any
fn attachment_of(msg: &Message) -> Option<Attachment> {
    MediaFlags::of(msg).attachment()
}

/// Run the Telegram bot until interrupted
pub async fn run_bot(config: Config) -> Result<()> {
    let catalog = SqliteCatalog::open(&config.database_url)?;
    let completion = GroqClient::from_config(&config)?;

    tracing::info!("===========================================");
    tracing::info!("  ReelFinder - Starting...");
    tracing::info!("===========================================");
    tracing::info!("Source channel: {}", config.channel_id);
    tracing::info!("Catalog database: {:?}", catalog.path());
    tracing::info!("Catalog entries: {}", catalog.count().await?);
    tracing::info!(
        "Completion model: {} (timeout {:?})",
        completion.model(),
        config.completion_timeout
    );

    let bot = Bot::new(config.telegram_token.clone());

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    }

    // Delete any existing webhook to ensure polling works
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));
    let events = Arc::new(EventHandler::new(
        Arc::new(catalog),
        Arc::new(completion),
        transport,
        config.channel_id,
    ));

    let handler = dptree::entry()
        .branch(Update::filter_channel_post().endpoint(channel_post_handler))
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    tracing::info!("Starting dispatcher with long polling...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![events])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in update handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

async fn deliver(events: &EventHandler, event: InboundEvent) {
    if let Err(e) = events.handle(event).await {
        tracing::warn!("Transport error: {}", e);
    }
}

/// Channel post endpoint
async fn channel_post_handler(msg: Message, events: Arc<EventHandler>) -> ResponseResult<()> {
    let post = BroadcastPost {
        channel_id: msg.chat.id.0,
        message_id: msg.id.0,
        attachment: attachment_of(&msg),
        caption: msg.caption().map(str::to_string),
    };

    deliver(&events, InboundEvent::Broadcast(post)).await;
    Ok(())
}

/// Text message endpoint
async fn message_handler(msg: Message, events: Arc<EventHandler>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // Commands are not catalog queries
    if text.starts_with('/') {
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    let text_preview = text.chars().take(50).collect::<String>();
    tracing::info!(">>> Query received: chat={}, text={:?}", chat_id, text_preview);

    let event = InboundEvent::TextQuery {
        conversation: ConversationId(chat_id),
        text: text.to_string(),
    };
    deliver(&events, event).await;
    Ok(())
}

/// Inline keyboard endpoint
async fn callback_handler(query: CallbackQuery, events: Arc<EventHandler>) -> ResponseResult<()> {
    // Fall back to the user's private chat if the prompt is gone
    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(query.from.id.0 as i64));

    tracing::info!("Selection: chat={}, data={:?}", chat_id.0, query.data);

    let event = InboundEvent::Selection {
        selection_id: query.id.to_string(),
        conversation: ConversationId(chat_id.0),
        token: query.data.clone(),
    };
    deliver(&events, event).await;
    Ok(())
}
