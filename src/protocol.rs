//! Messages crossing the UI / backend thread boundary.

use std::path::PathBuf;

use crate::grouping::{GroupHandle, MessageGroup};
use crate::message::{ConversationId, MessageId};
use crate::surface::Bubble;

/// Actions sent from the UI to the backend
#[derive(Debug, Clone)]
pub enum BackendAction {
    /// Open a conversation view and start polling it
    Open(ConversationId),
    /// Stop polling and discard the current view
    Close,
    /// Send text and/or one file to the open conversation
    Send {
        content: String,
        file: Option<PathBuf>,
    },
    /// The view was scrolled to the oldest visible message
    ScrolledToTop,
    /// Ask for the total unread count
    UnreadCount,
    /// Shut the backend down
    Quit,
}

/// Events sent from the backend to the UI
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    GroupAppended(MessageGroup),
    GroupPrepended(MessageGroup),
    BubbleAppended { group: GroupHandle, bubble: Bubble },
    BubblePrepended { group: GroupHandle, bubble: Bubble },
    BubbleRemoved(MessageId),
    /// A sent bubble now shows the read marker
    ReceiptRead(MessageId),
    ScrolledToBottom { smooth: bool },
    ScrollCorrected(f64),
    /// A conversation view was opened
    Opened(ConversationId),
    /// The conversation view was torn down
    Closed(ConversationId),
    /// No older history is available
    HistoryExhausted,
    UnreadCount(u64),
    /// Informational line for the status area
    Status(String),
    /// Non-fatal error for the status area
    Error(String),
}
