//! Rendering target contract and the bubble view-model it receives.
//!
//! The engine never inspects a concrete UI tree: it pushes groups and bubbles
//! through [`PresentationSurface`] and reads back scroll metrics. Two
//! implementations live here: [`MemorySurface`], a layout model measured in
//! rows, and [`ChannelSurface`], which keeps that model for metrics and
//! forwards every command to a UI thread.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, FixedOffset};
use crossbeam_channel::Sender;

use crate::format::{escape_and_linkify, human_file_size, relative_time};
use crate::grouping::{Direction, GroupHandle, MessageGroup};
use crate::message::{Attachment, Message, MessageId};
use crate::protocol::SurfaceEvent;

/// Label used when a file attachment has no name.
pub const DEFAULT_FILE_NAME: &str = "File";

#[derive(Clone, Debug, PartialEq)]
pub enum MediaView {
    Image { src: String },
    Video { src: String },
    Audio { src: String },
    File {
        name: String,
        size_label: String,
        href: String,
    },
}

impl MediaView {
    fn from_attachment(attachment: &Attachment) -> Self {
        match attachment {
            Attachment::Image { url } => MediaView::Image { src: url.clone() },
            Attachment::Video { url } => MediaView::Video { src: url.clone() },
            Attachment::Audio { url } => MediaView::Audio { src: url.clone() },
            Attachment::File { url, name, size } => MediaView::File {
                name: name.clone().unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
                size_label: human_file_size(size.unwrap_or(0)),
                href: url.clone(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadReceipt {
    /// Delivered, not read yet.
    Single,
    /// Read by the recipient.
    Double,
}

/// One rendered message.
#[derive(Clone, Debug, PartialEq)]
pub struct Bubble {
    pub id: MessageId,
    pub direction: Direction,
    /// Raw text, for surfaces that do not render markup.
    pub text: String,
    /// Escaped and linkified HTML.
    pub markup: Option<String>,
    pub media: Option<MediaView>,
    pub time_label: String,
    /// Sent bubbles only.
    pub receipt: Option<ReadReceipt>,
}

impl Bubble {
    pub fn build(message: &Message, direction: Direction, now: &DateTime<FixedOffset>) -> Self {
        let receipt = match direction {
            Direction::Sent if message.read_at.is_some() => Some(ReadReceipt::Double),
            Direction::Sent => Some(ReadReceipt::Single),
            Direction::Received => None,
        };
        Self {
            id: message.id.clone(),
            direction,
            text: message.text().to_string(),
            markup: message.content.as_deref().map(escape_and_linkify),
            media: message.attachment.as_ref().map(MediaView::from_attachment),
            time_label: relative_time(&message.created_at, now),
            receipt,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }

    /// Height in text rows: content lines, media block, footer.
    pub fn rows(&self) -> usize {
        let text_rows = if self.text.is_empty() {
            0
        } else {
            self.text.lines().count().max(1)
        };
        let media_rows = match &self.media {
            Some(MediaView::Image { .. }) | Some(MediaView::Video { .. }) => 4,
            Some(MediaView::Audio { .. }) | Some(MediaView::File { .. }) => 2,
            None => 0,
        };
        text_rows + media_rows + 1
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub content_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    /// At the oldest visible edge.
    pub fn is_at_top(&self) -> bool {
        self.scroll_top <= 0.0
    }

    pub fn max_scroll(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }
}

/// Commands the engine issues to whatever draws the conversation.
pub trait PresentationSurface: Send {
    fn append_group(&mut self, group: &MessageGroup);
    fn prepend_group(&mut self, group: &MessageGroup);
    fn append_bubble(&mut self, group: GroupHandle, bubble: &Bubble);
    fn prepend_bubble(&mut self, group: GroupHandle, bubble: &Bubble);
    fn remove_bubble(&mut self, id: &MessageId);
    /// The recipient has read this sent bubble.
    fn update_read_receipt(&mut self, id: &MessageId);
    fn scroll_to_bottom(&mut self, smooth: bool);
    fn scroll_metrics(&self) -> ScrollMetrics;
    fn apply_scroll_correction(&mut self, delta: f64);
    /// True if a bubble with this id is already displayed, including ones the
    /// engine did not place itself.
    fn mark_existing(&self, id: &MessageId) -> bool;
}

#[derive(Clone, Debug)]
pub struct SurfaceGroup {
    pub handle: GroupHandle,
    pub direction: Direction,
    pub sender_name: String,
    pub bubbles: VecDeque<Bubble>,
}

/// Row-based layout model of a conversation.
#[derive(Clone, Debug)]
pub struct MemorySurface {
    order: VecDeque<GroupHandle>,
    groups: HashMap<GroupHandle, SurfaceGroup>,
    scroll_top: f64,
    viewport_height: f64,
    row_height: f64,
}

impl MemorySurface {
    /// Rows taken by a group header (sender name / avatar line).
    const HEADER_ROWS: usize = 1;

    pub fn new(viewport_height: f64, row_height: f64) -> Self {
        Self {
            order: VecDeque::new(),
            groups: HashMap::new(),
            scroll_top: 0.0,
            viewport_height,
            row_height,
        }
    }

    /// Groups top to bottom.
    pub fn groups(&self) -> impl Iterator<Item = &SurfaceGroup> {
        self.order.iter().filter_map(|h| self.groups.get(h))
    }

    /// Every bubble id top to bottom.
    pub fn bubble_ids(&self) -> Vec<MessageId> {
        self.groups()
            .flat_map(|g| g.bubbles.iter().map(|b| b.id.clone()))
            .collect()
    }

    pub fn bubble(&self, id: &MessageId) -> Option<&Bubble> {
        self.groups()
            .flat_map(|g| g.bubbles.iter())
            .find(|b| &b.id == id)
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    /// Simulate the user scrolling to an absolute offset.
    pub fn scroll_to(&mut self, offset: f64) {
        self.scroll_top = offset.clamp(0.0, self.scroll_metrics().max_scroll());
    }

    fn content_rows(&self) -> usize {
        self.groups()
            .map(|g| Self::HEADER_ROWS + g.bubbles.iter().map(Bubble::rows).sum::<usize>())
            .sum()
    }

    fn insert_group(&mut self, group: &MessageGroup, front: bool) {
        if self.groups.contains_key(&group.handle) {
            return;
        }
        self.groups.insert(
            group.handle,
            SurfaceGroup {
                handle: group.handle,
                direction: group.direction,
                sender_name: group.sender_name.clone(),
                bubbles: VecDeque::new(),
            },
        );
        if front {
            self.order.push_front(group.handle);
        } else {
            self.order.push_back(group.handle);
        }
    }
}

impl PresentationSurface for MemorySurface {
    fn append_group(&mut self, group: &MessageGroup) {
        self.insert_group(group, false);
    }

    fn prepend_group(&mut self, group: &MessageGroup) {
        self.insert_group(group, true);
    }

    fn append_bubble(&mut self, group: GroupHandle, bubble: &Bubble) {
        if let Some(g) = self.groups.get_mut(&group) {
            g.bubbles.push_back(bubble.clone());
        }
    }

    fn prepend_bubble(&mut self, group: GroupHandle, bubble: &Bubble) {
        if let Some(g) = self.groups.get_mut(&group) {
            g.bubbles.push_front(bubble.clone());
        }
    }

    fn remove_bubble(&mut self, id: &MessageId) {
        for g in self.groups.values_mut() {
            g.bubbles.retain(|b| &b.id != id);
        }
    }

    fn update_read_receipt(&mut self, id: &MessageId) {
        let bubble = self
            .groups
            .values_mut()
            .flat_map(|g| g.bubbles.iter_mut())
            .find(|b| &b.id == id);
        if let Some(bubble) = bubble {
            if bubble.receipt.is_some() && !bubble.is_pending() {
                bubble.receipt = Some(ReadReceipt::Double);
            }
        }
    }

    fn scroll_to_bottom(&mut self, _smooth: bool) {
        self.scroll_top = self.scroll_metrics().max_scroll();
    }

    fn scroll_metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: self.scroll_top,
            content_height: self.content_rows() as f64 * self.row_height,
            viewport_height: self.viewport_height,
        }
    }

    fn apply_scroll_correction(&mut self, delta: f64) {
        self.scroll_top = (self.scroll_top + delta).max(0.0);
    }

    fn mark_existing(&self, id: &MessageId) -> bool {
        self.bubble(id).is_some()
    }
}

/// Surface for a UI running on another thread.
///
/// Metrics come from the local layout model; every command is also sent as a
/// [`SurfaceEvent`]. A closed receiver is ignored (the UI is shutting down).
pub struct ChannelSurface {
    layout: MemorySurface,
    event_tx: Sender<SurfaceEvent>,
}

impl ChannelSurface {
    pub fn new(event_tx: Sender<SurfaceEvent>, viewport_rows: usize) -> Self {
        Self {
            layout: MemorySurface::new(viewport_rows as f64, 1.0),
            event_tx,
        }
    }

    /// Mirror the UI's scroll position into the layout model.
    pub fn set_scroll_top(&mut self, offset: f64) {
        self.layout.scroll_to(offset);
    }

    fn emit(&self, event: SurfaceEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl PresentationSurface for ChannelSurface {
    fn append_group(&mut self, group: &MessageGroup) {
        self.layout.append_group(group);
        self.emit(SurfaceEvent::GroupAppended(group.clone()));
    }

    fn prepend_group(&mut self, group: &MessageGroup) {
        self.layout.prepend_group(group);
        self.emit(SurfaceEvent::GroupPrepended(group.clone()));
    }

    fn append_bubble(&mut self, group: GroupHandle, bubble: &Bubble) {
        self.layout.append_bubble(group, bubble);
        self.emit(SurfaceEvent::BubbleAppended {
            group,
            bubble: bubble.clone(),
        });
    }

    fn prepend_bubble(&mut self, group: GroupHandle, bubble: &Bubble) {
        self.layout.prepend_bubble(group, bubble);
        self.emit(SurfaceEvent::BubblePrepended {
            group,
            bubble: bubble.clone(),
        });
    }

    fn remove_bubble(&mut self, id: &MessageId) {
        self.layout.remove_bubble(id);
        self.emit(SurfaceEvent::BubbleRemoved(id.clone()));
    }

    fn update_read_receipt(&mut self, id: &MessageId) {
        let unread = self
            .layout
            .bubble(id)
            .is_some_and(|b| b.receipt == Some(ReadReceipt::Single));
        if unread {
            self.layout.update_read_receipt(id);
            self.emit(SurfaceEvent::ReceiptRead(id.clone()));
        }
    }

    fn scroll_to_bottom(&mut self, smooth: bool) {
        self.layout.scroll_to_bottom(smooth);
        self.emit(SurfaceEvent::ScrolledToBottom { smooth });
    }

    fn scroll_metrics(&self) -> ScrollMetrics {
        self.layout.scroll_metrics()
    }

    fn apply_scroll_correction(&mut self, delta: f64) {
        self.layout.apply_scroll_correction(delta);
        self.emit(SurfaceEvent::ScrollCorrected(delta));
    }

    fn mark_existing(&self, id: &MessageId) -> bool {
        self.layout.mark_existing(id)
    }
}
