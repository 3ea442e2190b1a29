//! Per-conversation sync state, separated from rendering.
//!
//! `ConversationSyncState` tracks the poll watermark, the history cursor and
//! the flags that keep polls and history loads from overlapping. It is owned
//! by exactly one conversation view.

use crate::message::ConversationId;

#[derive(Debug, Clone)]
pub struct ConversationSyncState {
    pub conversation_id: ConversationId,

    /// Highest confirmed id processed; only ever increases.
    newest_id: Option<i64>,

    /// Lowest confirmed id shown; history is fetched before it.
    oldest_id: Option<i64>,

    /// A history page is in flight.
    loading: bool,

    /// Cleared for good once the server runs out of history.
    has_more: bool,

    polling_active: bool,
    poll_in_flight: bool,

    /// Bumped on every start/stop so results from an older loop are dropped.
    poll_epoch: u64,

    closed: bool,
}

impl ConversationSyncState {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            newest_id: None,
            oldest_id: None,
            loading: false,
            has_more: true,
            polling_active: false,
            poll_in_flight: false,
            poll_epoch: 0,
            closed: false,
        }
    }

    pub fn watermark(&self) -> Option<i64> {
        self.newest_id
    }

    /// Raise the watermark to `id` if it is higher.
    pub fn advance_watermark(&mut self, id: i64) {
        self.newest_id = Some(self.newest_id.map_or(id, |w| w.max(id)));
    }

    pub fn oldest_id(&self) -> Option<i64> {
        self.oldest_id
    }

    /// Move the history cursor down to `id` if it is lower.
    pub fn lower_oldest(&mut self, id: i64) {
        self.oldest_id = Some(self.oldest_id.map_or(id, |o| o.min(id)));
    }

    /// Note a confirmed id that is now on screen.
    pub fn observe(&mut self, id: i64) {
        self.advance_watermark(id);
        self.lower_oldest(id);
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_polling(&self) -> bool {
        self.polling_active
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Enter the active polling state, invalidating any previous loop.
    pub fn begin_polling(&mut self) -> u64 {
        self.poll_epoch += 1;
        self.polling_active = true;
        self.poll_in_flight = false;
        self.poll_epoch
    }

    /// Back to idle. Safe to call when already idle.
    pub fn stop_polling(&mut self) {
        if self.polling_active {
            self.poll_epoch += 1;
        }
        self.polling_active = false;
        self.poll_in_flight = false;
    }

    /// Whether results tagged with `epoch` may still be applied.
    pub fn is_current_poll(&self, epoch: u64) -> bool {
        !self.closed && self.polling_active && self.poll_epoch == epoch
    }

    /// Claim the poll slot for one tick. False means skip this tick.
    pub fn try_begin_poll(&mut self, epoch: u64) -> bool {
        if !self.is_current_poll(epoch) || self.poll_in_flight {
            return false;
        }
        self.poll_in_flight = true;
        true
    }

    pub fn end_poll(&mut self, epoch: u64) {
        if self.poll_epoch == epoch {
            self.poll_in_flight = false;
        }
    }

    /// Claim the history slot. False while a load runs, after the history
    /// ran out, or once the view is closed.
    pub fn try_begin_load(&mut self) -> bool {
        if self.closed || !self.has_more || self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    pub fn end_load(&mut self) {
        self.loading = false;
    }

    /// No older history exists for this session.
    pub fn mark_exhausted(&mut self) {
        self.has_more = false;
    }

    pub fn close(&mut self) {
        self.stop_polling();
        self.closed = true;
    }
}
