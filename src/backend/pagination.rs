//! Loading older history when the view reaches its oldest edge.

use std::sync::Arc;

use crate::surface::PresentationSurface;
use crate::transport::ChatTransport;

use super::view::{lock_view, SharedView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Not at the edge, a load is in flight, history is exhausted, or the
    /// view is closed. No request was made.
    Skipped,
    /// Bubbles placed from a non-empty page.
    Loaded(usize),
    /// The server returned an empty page.
    Exhausted,
    /// Request or payload failure; the next edge event retries.
    Failed,
}

pub struct PaginationLoader<T, S> {
    view: SharedView<S>,
    transport: Arc<T>,
    page_size: usize,
}

impl<T, S> Clone for PaginationLoader<T, S> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            transport: self.transport.clone(),
            page_size: self.page_size,
        }
    }
}

impl<T, S> PaginationLoader<T, S>
where
    T: ChatTransport,
    S: PresentationSurface + 'static,
{
    pub fn new(view: SharedView<S>, transport: Arc<T>, page_size: usize) -> Self {
        Self {
            view,
            transport,
            page_size: page_size.max(1),
        }
    }

    /// Scroll event from the surface: load a page only at the oldest edge.
    pub async fn on_scroll(&self) -> LoadOutcome {
        let at_top = lock_view(&self.view).surface().scroll_metrics().is_at_top();
        if !at_top {
            return LoadOutcome::Skipped;
        }
        self.load_older().await
    }

    /// Fetch and prepend the page before the oldest rendered message.
    pub async fn load_older(&self) -> LoadOutcome {
        let (conversation_id, before) = {
            let mut view = lock_view(&self.view);
            if !view.state_mut().try_begin_load() {
                return LoadOutcome::Skipped;
            }
            (view.conversation_id(), view.state().oldest_id())
        };

        tracing::debug!(conversation_id, before, "loading older messages");
        let result = self
            .transport
            .fetch_older(conversation_id, before, self.page_size)
            .await;

        let mut view = lock_view(&self.view);
        if view.state().is_closed() {
            view.state_mut().end_load();
            return LoadOutcome::Skipped;
        }

        match result {
            Ok(page) => {
                let outcome = view.apply_page(page.messages, page.has_more);
                if outcome == LoadOutcome::Exhausted || !view.state().has_more() {
                    tracing::info!(conversation_id, "reached start of history");
                }
                outcome
            }
            Err(e) => {
                view.state_mut().end_load();
                tracing::warn!(conversation_id, error = %e, "failed to load older messages");
                LoadOutcome::Failed
            }
        }
    }

    /// More history may exist.
    pub fn has_more(&self) -> bool {
        lock_view(&self.view).state().has_more()
    }
}
