//! One open conversation: view, transport, poll loop and history loader.
//!
//! Sessions are independent values; opening two conversations side by side
//! means holding two `ChatSession`s.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::message::{ConversationId, Message, MessageId, UserId};
use crate::surface::PresentationSurface;
use crate::transport::{ChatTransport, FileUpload, OutgoingMessage};
use crate::validation::{sanitize_content, validate_outgoing};

use super::pagination::{LoadOutcome, PaginationLoader};
use super::poll::PollLoop;
use super::view::{lock_view, ConversationView, SharedView};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub current_user: UserId,
    pub display_name: String,
    pub poll_interval: Duration,
    pub page_size: usize,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            current_user: settings.current_user_id,
            display_name: settings.display_name.clone(),
            poll_interval: settings.poll_interval(),
            page_size: settings.page_size,
        }
    }
}

pub struct ChatSession<T, S> {
    view: SharedView<S>,
    transport: Arc<T>,
    poller: PollLoop<T, S>,
    pager: PaginationLoader<T, S>,
    options: SessionOptions,
}

impl<T, S> ChatSession<T, S>
where
    T: ChatTransport,
    S: PresentationSurface + 'static,
{
    pub fn new(
        conversation_id: ConversationId,
        transport: Arc<T>,
        surface: S,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        let view = ConversationView::new(conversation_id, options.current_user, clock, surface)
            .into_shared();
        let poller = PollLoop::new(view.clone(), transport.clone(), options.poll_interval);
        let pager = PaginationLoader::new(view.clone(), transport.clone(), options.page_size);
        Self {
            view,
            transport,
            poller,
            pager,
            options,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        lock_view(&self.view).conversation_id()
    }

    pub fn view(&self) -> &SharedView<S> {
        &self.view
    }

    pub fn pager(&self) -> PaginationLoader<T, S> {
        self.pager.clone()
    }

    /// Adopt messages that were rendered before the session took over.
    pub fn seed(&self, messages: Vec<Message>) -> usize {
        lock_view(&self.view).seed(messages)
    }

    /// Load the latest page if nothing is shown yet, then start polling.
    pub async fn open(&mut self) -> LoadOutcome {
        let empty = lock_view(&self.view).latest_rendered_confirmed().is_none();
        let outcome = if empty {
            let outcome = self.pager.load_older().await;
            if matches!(outcome, LoadOutcome::Loaded(_)) {
                lock_view(&self.view).surface_mut().scroll_to_bottom(false);
            }
            outcome
        } else {
            LoadOutcome::Skipped
        };
        self.start_polling();
        outcome
    }

    pub fn start_polling(&mut self) {
        self.poller.start();
    }

    pub fn stop_polling(&mut self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    /// Stop polling and refuse all further results for this view.
    pub fn close(&mut self) {
        self.poller.stop();
        let mut view = lock_view(&self.view);
        view.state_mut().close();
        tracing::info!(conversation_id = view.conversation_id(), "conversation closed");
    }

    /// Render a temporary bubble on behalf of the caller before sending.
    pub fn show_pending(&self, content: &str) -> MessageId {
        let mut view = lock_view(&self.view);
        let now = view.clock().now();
        let message = Message::pending(
            self.options.current_user,
            &self.options.display_name,
            &sanitize_content(content),
            now,
        );
        view.register_pending(&message);
        message.id
    }

    pub fn withdraw_pending(&self, id: &MessageId) -> bool {
        lock_view(&self.view).withdraw_pending(id)
    }

    /// Send text and at most one file. The confirmed message is rendered by
    /// the next poll, not from the response.
    pub async fn send(&self, content: &str, file: Option<FileUpload>) -> Result<Option<Message>> {
        let content = validate_outgoing(content, file.is_some()).map_err(SyncError::InvalidMessage)?;

        let conversation_id = {
            let view = lock_view(&self.view);
            if view.state().is_closed() {
                return Err(SyncError::InvalidMessage("conversation is closed".to_string()));
            }
            view.conversation_id()
        };

        let outgoing = OutgoingMessage { content, file };
        match self.transport.send(conversation_id, &outgoing).await {
            Ok(echo) => {
                tracing::debug!(
                    conversation_id,
                    message_id = ?echo.as_ref().map(|m| m.id.to_string()),
                    "message sent"
                );
                Ok(echo)
            }
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "send failed");
                Err(e)
            }
        }
    }

    pub async fn unread_count(&self) -> Result<u64> {
        self.transport.unread_count().await
    }
}
