//! Grouping of consecutive same-sender messages by calendar day.
//!
//! Groups are keyed by (sender, day bucket) and live for the whole session:
//! both the live path and the history path resolve through the same index so
//! a day's group is never created twice. Bubble order inside a group is
//! decided by the caller (append for live messages, prepend for history).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::clock::Clock;
use crate::format::{avatar_initial, date_bucket};
use crate::message::{Message, MessageId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn of(message: &Message, current_user: UserId) -> Self {
        if message.sender_id == current_user {
            Direction::Sent
        } else {
            Direction::Received
        }
    }
}

/// Stable reference to a group for the lifetime of the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupHandle(usize);

impl GroupHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub sender_id: UserId,
    pub day: String,
}

/// Avatar slot, only allocated for received groups.
#[derive(Clone, Debug, PartialEq)]
pub enum Avatar {
    Image { url: String, alt: String },
    Initial(char),
}

impl Avatar {
    fn for_sender(message: &Message) -> Self {
        match &message.sender_avatar {
            Some(url) => Avatar::Image {
                url: url.clone(),
                alt: message.sender_name.clone(),
            },
            None => Avatar::Initial(avatar_initial(&message.sender_name)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessageGroup {
    pub handle: GroupHandle,
    pub key: GroupKey,
    pub direction: Direction,
    pub sender_name: String,
    pub avatar: Option<Avatar>,
    bubbles: VecDeque<MessageId>,
}

impl MessageGroup {
    /// Bubble identifiers in display order.
    pub fn bubbles(&self) -> impl Iterator<Item = &MessageId> {
        self.bubbles.iter()
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub handle: GroupHandle,
    /// The group did not exist before this call.
    pub created: bool,
}

pub struct GroupingIndex {
    clock: Arc<dyn Clock>,
    groups: Vec<MessageGroup>,
    by_key: HashMap<GroupKey, GroupHandle>,
    placement: HashMap<MessageId, GroupHandle>,
}

impl GroupingIndex {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            groups: Vec::new(),
            by_key: HashMap::new(),
            placement: HashMap::new(),
        }
    }

    pub fn key_for(&self, message: &Message) -> GroupKey {
        GroupKey {
            sender_id: message.sender_id,
            day: date_bucket(&self.clock.local(&message.created_at)),
        }
    }

    /// Find the group for this message's (sender, day), creating it if needed.
    pub fn resolve_group(&mut self, message: &Message, direction: Direction) -> Resolved {
        let key = self.key_for(message);
        if let Some(&handle) = self.by_key.get(&key) {
            return Resolved {
                handle,
                created: false,
            };
        }

        let handle = GroupHandle(self.groups.len());
        let avatar = match direction {
            Direction::Received => Some(Avatar::for_sender(message)),
            Direction::Sent => None,
        };
        self.groups.push(MessageGroup {
            handle,
            key: key.clone(),
            direction,
            sender_name: message.sender_name.clone(),
            avatar,
            bubbles: VecDeque::new(),
        });
        self.by_key.insert(key, handle);
        tracing::trace!(group = handle.0, "created message group");

        Resolved {
            handle,
            created: true,
        }
    }

    pub fn group(&self, handle: GroupHandle) -> Option<&MessageGroup> {
        self.groups.get(handle.0)
    }

    /// Groups in creation order.
    pub fn groups(&self) -> &[MessageGroup] {
        &self.groups
    }

    pub fn group_of(&self, id: &MessageId) -> Option<GroupHandle> {
        self.placement.get(id).copied()
    }

    /// Place a bubble at the end of a group. Returns false if the id is
    /// already placed somewhere (placement never moves).
    pub fn push_back(&mut self, handle: GroupHandle, id: MessageId) -> bool {
        self.place(handle, id, false)
    }

    /// Place a bubble at the start of a group.
    pub fn push_front(&mut self, handle: GroupHandle, id: MessageId) -> bool {
        self.place(handle, id, true)
    }

    fn place(&mut self, handle: GroupHandle, id: MessageId, front: bool) -> bool {
        if self.placement.contains_key(&id) {
            return false;
        }
        let Some(group) = self.groups.get_mut(handle.0) else {
            return false;
        };
        if front {
            group.bubbles.push_front(id.clone());
        } else {
            group.bubbles.push_back(id.clone());
        }
        self.placement.insert(id, handle);
        true
    }

    /// Drop a bubble from its group. The group itself stays.
    pub fn remove(&mut self, id: &MessageId) -> Option<GroupHandle> {
        let handle = self.placement.remove(id)?;
        if let Some(group) = self.groups.get_mut(handle.0) {
            group.bubbles.retain(|b| b != id);
        }
        Some(handle)
    }
}
