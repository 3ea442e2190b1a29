//! The single-writer owner of one conversation's rendering state.
//!
//! Sync state, grouping index, reconciler and surface are mutated together
//! under one lock so their invariants hold across the poll task, the history
//! loader and the send path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::Clock;
use crate::grouping::{Direction, GroupingIndex};
use crate::message::{ConversationId, Message, MessageId, UserId};
use crate::reconcile::{Action, Reconciler};
use crate::state::ConversationSyncState;
use crate::surface::{Bubble, PresentationSurface};

use super::pagination::LoadOutcome;

pub type SharedView<S> = Arc<Mutex<ConversationView<S>>>;

/// Lock a shared view. A panic elsewhere while holding the lock does not
/// invalidate the data, so poisoning is ignored.
pub fn lock_view<S>(view: &SharedView<S>) -> MutexGuard<'_, ConversationView<S>> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConversationView<S> {
    state: ConversationSyncState,
    grouping: GroupingIndex,
    reconciler: Reconciler,
    surface: S,
    clock: Arc<dyn Clock>,
    current_user: UserId,
}

impl<S: PresentationSurface> ConversationView<S> {
    pub fn new(
        conversation_id: ConversationId,
        current_user: UserId,
        clock: Arc<dyn Clock>,
        surface: S,
    ) -> Self {
        Self {
            state: ConversationSyncState::new(conversation_id),
            grouping: GroupingIndex::new(clock.clone()),
            reconciler: Reconciler::new(current_user),
            surface,
            clock,
            current_user,
        }
    }

    pub fn into_shared(self) -> SharedView<S> {
        Arc::new(Mutex::new(self))
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.state.conversation_id
    }

    pub fn current_user(&self) -> UserId {
        self.current_user
    }

    pub fn state(&self) -> &ConversationSyncState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConversationSyncState {
        &mut self.state
    }

    pub fn grouping(&self) -> &GroupingIndex {
        &self.grouping
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Render messages that were already on screen when the view was opened.
    /// Returns how many were new to the view.
    pub fn seed(&mut self, mut messages: Vec<Message>) -> usize {
        messages.retain(|m| !m.is_temporary());
        messages.sort_by_key(|m| m.id.confirmed());

        let mut placed = 0;
        for message in &messages {
            if self.reconciler.is_rendered(&message.id) {
                continue;
            }
            self.reconciler.note_rendered(&message.id);
            self.place(message, false);
            if let Some(id) = message.id.confirmed() {
                self.state.observe(id);
            }
            placed += 1;
        }
        if placed > 0 {
            self.surface.scroll_to_bottom(false);
        }
        placed
    }

    /// Show a temporary bubble for a message this client is about to send.
    pub fn register_pending(&mut self, message: &Message) -> bool {
        if !message.is_temporary() {
            return false;
        }
        let inserted = self.absorb(message) == Action::Insert;
        if inserted {
            self.surface.scroll_to_bottom(true);
        }
        inserted
    }

    /// Take back a temporary bubble whose send failed.
    pub fn withdraw_pending(&mut self, id: &MessageId) -> bool {
        if !self.reconciler.forget_pending(id) {
            return false;
        }
        self.grouping.remove(id);
        self.surface.remove_bubble(id);
        true
    }

    /// Run one live message through the reconciler and render the outcome.
    pub fn absorb(&mut self, message: &Message) -> Action {
        if !self.reconciler.is_rendered(&message.id) && self.surface.mark_existing(&message.id) {
            // drawn by someone else; adopt it without a second bubble
            self.reconciler.note_rendered(&message.id);
            if let Some(id) = message.id.confirmed() {
                self.state.observe(id);
            }
            self.refresh_receipt(message);
            return Action::Ignore;
        }

        let action = self.reconciler.absorb(message);
        if action == Action::Ignore {
            self.refresh_receipt(message);
            return action;
        }
        if let Action::ReplacePending(temp_id) = &action {
            tracing::debug!(
                conversation_id = self.state.conversation_id,
                temp_id = %temp_id,
                message_id = %message.id,
                "confirmed pending message"
            );
            self.grouping.remove(temp_id);
            self.surface.remove_bubble(temp_id);
        }

        self.place(message, false);
        if let Some(id) = message.id.confirmed() {
            self.state.observe(id);
        }
        action
    }

    /// Apply one poll result. Returns the confirmed ids that were accepted,
    /// or `None` if the result belongs to a loop that is no longer current.
    pub fn apply_poll(&mut self, epoch: u64, batch: &[Message]) -> Option<Vec<i64>> {
        if !self.state.is_current_poll(epoch) {
            return None;
        }

        let mut accepted = Vec::new();
        let mut rendered = false;
        for message in batch {
            if self.absorb(message) == Action::Ignore {
                continue;
            }
            rendered = true;
            if let Some(id) = message.id.confirmed() {
                accepted.push(id);
            }
        }
        if rendered {
            self.surface.scroll_to_bottom(true);
        }
        Some(accepted)
    }

    /// Prepend one page of history while keeping the visible content still.
    ///
    /// Must be paired with a successful `try_begin_load`; the load slot is
    /// released here.
    pub fn apply_page(&mut self, mut page: Vec<Message>, has_more: Option<bool>) -> LoadOutcome {
        page.retain(|m| !m.is_temporary());
        if page.is_empty() {
            self.state.mark_exhausted();
            self.state.end_load();
            return LoadOutcome::Exhausted;
        }

        let height_before = self.surface.scroll_metrics().content_height;

        page.sort_by_key(|m| m.id.confirmed());
        let mut placed = 0;
        for message in page.iter().rev() {
            if let Some(id) = message.id.confirmed() {
                self.state.lower_oldest(id);
            }
            if self.reconciler.is_rendered(&message.id) || self.surface.mark_existing(&message.id) {
                self.reconciler.note_rendered(&message.id);
                self.refresh_receipt(message);
                continue;
            }
            self.reconciler.note_rendered(&message.id);
            self.place(message, true);
            if let Some(id) = message.id.confirmed() {
                self.state.advance_watermark(id);
            }
            placed += 1;
        }

        let delta = self.surface.scroll_metrics().content_height - height_before;
        if delta != 0.0 {
            self.surface.apply_scroll_correction(delta);
        }

        if has_more == Some(false) {
            self.state.mark_exhausted();
        }
        self.state.end_load();
        LoadOutcome::Loaded(placed)
    }

    /// Highest confirmed id currently rendered.
    pub fn latest_rendered_confirmed(&self) -> Option<i64> {
        self.reconciler.latest_confirmed()
    }

    /// A repeat delivery of one of our own messages may carry a read time the
    /// rendered bubble does not show yet.
    fn refresh_receipt(&mut self, message: &Message) {
        if message.is_temporary() || message.sender_id != self.current_user || message.read_at.is_none() {
            return;
        }
        self.surface.update_read_receipt(&message.id);
    }

    fn place(&mut self, message: &Message, front: bool) {
        let direction = Direction::of(message, self.current_user);
        let resolved = self.grouping.resolve_group(message, direction);
        if resolved.created {
            if let Some(group) = self.grouping.group(resolved.handle) {
                if front {
                    self.surface.prepend_group(group);
                } else {
                    self.surface.append_group(group);
                }
            }
        }

        let placed = if front {
            self.grouping.push_front(resolved.handle, message.id.clone())
        } else {
            self.grouping.push_back(resolved.handle, message.id.clone())
        };
        if !placed {
            return;
        }

        let now = self.clock.local(&self.clock.now());
        let bubble = Bubble::build(message, direction, &now);
        if front {
            self.surface.prepend_bubble(resolved.handle, &bubble);
        } else {
            self.surface.append_bubble(resolved.handle, &bubble);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::surface::{MemorySurface, ReadReceipt};

    const ME: UserId = 1;
    const PEER: UserId = 2;

    fn message(id: i64, sender: UserId, text: &str, at: &str) -> Message {
        Message {
            id: MessageId::Confirmed(id),
            sender_id: sender,
            sender_name: format!("user{}", sender),
            sender_avatar: None,
            content: Some(text.to_string()),
            attachment: None,
            created_at: at.parse().unwrap(),
            read_at: None,
        }
    }

    fn view() -> ConversationView<MemorySurface> {
        let clock = FixedClock::utc("2024-05-02T12:00:00Z".parse().unwrap());
        ConversationView::new(3, ME, Arc::new(clock), MemorySurface::new(100.0, 10.0))
    }

    #[test]
    fn test_seed_renders_chronologically() {
        let mut v = view();
        let placed = v.seed(vec![
            message(6, PEER, "b", "2024-05-02T09:01:00Z"),
            message(5, PEER, "a", "2024-05-02T09:00:00Z"),
        ]);
        assert_eq!(placed, 2);
        assert_eq!(
            v.surface().bubble_ids(),
            vec![MessageId::Confirmed(5), MessageId::Confirmed(6)]
        );
        assert_eq!(v.state().watermark(), Some(6));
        assert_eq!(v.state().oldest_id(), Some(5));
    }

    #[test]
    fn test_absorb_adopts_bubbles_already_on_surface() {
        let mut v = view();
        let m = message(9, PEER, "x", "2024-05-02T09:00:00Z");
        v.seed(vec![m.clone()]);
        assert_eq!(v.absorb(&m), Action::Ignore);
        assert_eq!(v.surface().bubble_ids().len(), 1);
    }

    #[test]
    fn test_adopted_bubble_advances_watermark() {
        let mut v = view();
        let m = message(14, PEER, "from elsewhere", "2024-05-02T09:00:00Z");

        // Drawn on the surface without going through the view.
        let mut index = GroupingIndex::new(v.clock().clone());
        let resolved = index.resolve_group(&m, Direction::Received);
        let group = index.group(resolved.handle).unwrap().clone();
        let now = v.clock().local(&v.clock().now());
        v.surface_mut().append_group(&group);
        v.surface_mut()
            .append_bubble(resolved.handle, &Bubble::build(&m, Direction::Received, &now));

        assert_eq!(v.absorb(&m), Action::Ignore);
        assert_eq!(v.surface().bubble_ids(), vec![MessageId::Confirmed(14)]);
        assert!(v.reconciler().is_rendered(&m.id));
        assert_eq!(v.state().watermark(), Some(14));
    }

    #[test]
    fn test_repeat_delivery_updates_read_receipt() {
        let mut v = view();
        let mut m = message(20, ME, "seen yet?", "2024-05-02T10:00:00Z");
        v.seed(vec![m.clone()]);
        let receipt = |v: &ConversationView<MemorySurface>| {
            v.surface().bubble(&MessageId::Confirmed(20)).and_then(|b| b.receipt)
        };
        assert_eq!(receipt(&v), Some(ReadReceipt::Single));

        m.read_at = Some("2024-05-02T10:05:00Z".parse().unwrap());
        assert_eq!(v.absorb(&m), Action::Ignore);
        assert_eq!(receipt(&v), Some(ReadReceipt::Double));
        assert_eq!(v.surface().bubble_ids().len(), 1);
    }

    #[test]
    fn test_withdraw_pending_removes_bubble() {
        let mut v = view();
        let temp = Message::pending(ME, "me", "draft", "2024-05-02T11:59:00Z".parse().unwrap());
        assert!(v.register_pending(&temp));
        assert_eq!(v.surface().bubble_ids(), vec![temp.id.clone()]);

        assert!(v.withdraw_pending(&temp.id));
        assert!(v.surface().bubble_ids().is_empty());
        assert!(!v.withdraw_pending(&temp.id));
        assert_eq!(v.reconciler().pending_count(), 0);
    }

    #[test]
    fn test_stale_poll_result_is_dropped() {
        let mut v = view();
        let old_epoch = v.state_mut().begin_polling();
        v.state_mut().stop_polling();
        let batch = vec![message(12, PEER, "late", "2024-05-02T11:00:00Z")];
        assert_eq!(v.apply_poll(old_epoch, &batch), None);
        assert!(v.surface().bubble_ids().is_empty());
        assert_eq!(v.state().watermark(), None);
    }

    #[test]
    fn test_page_with_final_flag_exhausts_history() {
        let mut v = view();
        assert!(v.state_mut().try_begin_load());
        let outcome = v.apply_page(vec![message(2, PEER, "old", "2024-05-01T08:00:00Z")], Some(false));
        assert_eq!(outcome, LoadOutcome::Loaded(1));
        assert!(!v.state().has_more());
        assert!(!v.state().is_loading());
    }
}
