//! Reconciliation of incoming messages against what is already on screen.
//!
//! Two in-memory structures replace any lookup through the rendering layer:
//! the set of rendered identifiers (duplicate delivery from overlapping poll
//! windows) and the list of pending temporary messages sent from this client
//! (speculative echoes waiting for their confirmed counterpart).
//!
//! Matching a pending message is by sender and trimmed text equality, not by a
//! correlation token. Two identical texts sent in quick succession are
//! ambiguous; the oldest pending entry is replaced first.

use std::collections::HashSet;

use crate::message::{Message, MessageId, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Render as a new bubble.
    Insert,
    /// Remove the given temporary bubble and render the confirmed one.
    ReplacePending(MessageId),
    /// Already on screen.
    Ignore,
}

#[derive(Clone, Debug)]
struct PendingEntry {
    id: MessageId,
    sender_id: UserId,
    text: String,
}

#[derive(Debug)]
pub struct Reconciler {
    current_user: UserId,
    rendered: HashSet<MessageId>,
    pending: Vec<PendingEntry>,
}

impl Reconciler {
    pub fn new(current_user: UserId) -> Self {
        Self {
            current_user,
            rendered: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Decide what to do with an incoming message and record the outcome.
    ///
    /// Feeding the same message twice yields `Ignore` the second time.
    pub fn absorb(&mut self, incoming: &Message) -> Action {
        if self.rendered.contains(&incoming.id) {
            return Action::Ignore;
        }

        if incoming.is_temporary() {
            self.pending.push(PendingEntry {
                id: incoming.id.clone(),
                sender_id: incoming.sender_id,
                text: incoming.text().trim().to_string(),
            });
            self.rendered.insert(incoming.id.clone());
            return Action::Insert;
        }

        let action = match self.take_matching_pending(incoming) {
            Some(temp_id) => {
                self.rendered.remove(&temp_id);
                Action::ReplacePending(temp_id)
            }
            None => Action::Insert,
        };
        self.rendered.insert(incoming.id.clone());
        action
    }

    fn take_matching_pending(&mut self, incoming: &Message) -> Option<MessageId> {
        // Only our own echoes can confirm a pending (sent-side) bubble.
        if incoming.sender_id != self.current_user {
            return None;
        }
        let text = incoming.text().trim();
        let pos = self
            .pending
            .iter()
            .position(|p| p.sender_id == incoming.sender_id && p.text == text)?;
        Some(self.pending.remove(pos).id)
    }

    /// Record a message that reached the screen by another path (history page,
    /// pre-rendered view). Returns false if it was already known.
    pub fn note_rendered(&mut self, id: &MessageId) -> bool {
        self.rendered.insert(id.clone())
    }

    pub fn is_rendered(&self, id: &MessageId) -> bool {
        self.rendered.contains(id)
    }

    /// Drop a pending entry whose send was abandoned.
    pub fn forget_pending(&mut self, id: &MessageId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| &p.id != id);
        self.rendered.remove(id);
        self.pending.len() != before
    }

    pub fn pending(&self) -> impl Iterator<Item = &MessageId> {
        self.pending.iter().map(|p| &p.id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Highest confirmed identifier on screen.
    pub fn latest_confirmed(&self) -> Option<i64> {
        self.rendered.iter().filter_map(MessageId::confirmed).max()
    }

    /// Lowest confirmed identifier on screen.
    pub fn oldest_confirmed(&self) -> Option<i64> {
        self.rendered.iter().filter_map(MessageId::confirmed).min()
    }
}
