//! Handlers for actions coming from the UI thread.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::backend::pagination::LoadOutcome;
use crate::backend::session::{ChatSession, SessionOptions};
use crate::backend::view::lock_view;
use crate::clock::SystemClock;
use crate::protocol::{BackendAction, SurfaceEvent};
use crate::surface::ChannelSurface;
use crate::transport::{ChatTransport, FileUpload};
use crate::validation::validate_outgoing;

/// Rows the layout model assumes are visible in the UI.
pub const VIEWPORT_ROWS: usize = 30;

pub type Session<T> = ChatSession<T, ChannelSurface>;

/// Handle one backend action. Returns false when the backend should exit.
pub async fn handle_backend_action<T: ChatTransport>(
    action: BackendAction,
    session: &mut Option<Session<T>>,
    transport: &Arc<T>,
    options: &SessionOptions,
    event_tx: &Sender<SurfaceEvent>,
) -> bool {
    match action {
        BackendAction::Open(conversation_id) => {
            close_session(session, event_tx);

            let surface = ChannelSurface::new(event_tx.clone(), VIEWPORT_ROWS);
            let mut opened = ChatSession::new(
                conversation_id,
                transport.clone(),
                surface,
                Arc::new(SystemClock),
                options.clone(),
            );
            let _ = event_tx.send(SurfaceEvent::Opened(conversation_id));

            match opened.open().await {
                LoadOutcome::Exhausted => {
                    let _ = event_tx.send(SurfaceEvent::HistoryExhausted);
                }
                LoadOutcome::Failed => {
                    let _ = event_tx.send(SurfaceEvent::Error(
                        "Could not load history; new messages will still arrive".into(),
                    ));
                }
                LoadOutcome::Loaded(_) | LoadOutcome::Skipped => {
                    if !opened.pager().has_more() {
                        let _ = event_tx.send(SurfaceEvent::HistoryExhausted);
                    }
                }
            }
            *session = Some(opened);
        }
        BackendAction::Close => {
            if !close_session(session, event_tx) {
                let _ = event_tx.send(SurfaceEvent::Status("No conversation open".into()));
            }
        }
        BackendAction::Send { content, file } => {
            let Some(s) = session.as_ref() else {
                let _ = event_tx.send(SurfaceEvent::Error("Open a conversation first".into()));
                return true;
            };

            let upload = match file {
                Some(path) => match FileUpload::from_path(&path).await {
                    Ok(upload) => Some(upload),
                    Err(e) => {
                        let _ = event_tx.send(SurfaceEvent::Error(format!(
                            "Cannot read {}: {}",
                            path.display(),
                            e
                        )));
                        return true;
                    }
                },
                None => None,
            };

            let content = match validate_outgoing(&content, upload.is_some()) {
                Ok(content) => content,
                Err(reason) => {
                    let _ = event_tx.send(SurfaceEvent::Error(reason));
                    return true;
                }
            };

            let temp_id = s.show_pending(&content);
            if let Err(e) = s.send(&content, upload).await {
                s.withdraw_pending(&temp_id);
                let _ = event_tx.send(SurfaceEvent::Error(format!("Send failed: {}", e)));
            }
        }
        BackendAction::ScrolledToTop => {
            let Some(s) = session.as_ref() else {
                return true;
            };
            lock_view(s.view()).surface_mut().set_scroll_top(0.0);

            // Load in the background so the action queue keeps draining.
            let pager = s.pager();
            let tx = event_tx.clone();
            tokio::spawn(async move {
                match pager.on_scroll().await {
                    LoadOutcome::Exhausted => {
                        let _ = tx.send(SurfaceEvent::HistoryExhausted);
                    }
                    LoadOutcome::Loaded(_) if !pager.has_more() => {
                        let _ = tx.send(SurfaceEvent::HistoryExhausted);
                    }
                    LoadOutcome::Failed => {
                        let _ = tx.send(SurfaceEvent::Error("Could not load older messages".into()));
                    }
                    _ => {}
                }
            });
        }
        BackendAction::UnreadCount => {
            let tx = event_tx.clone();
            let transport = transport.clone();
            tokio::spawn(async move {
                match transport.unread_count().await {
                    Ok(count) => {
                        let _ = tx.send(SurfaceEvent::UnreadCount(count));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unread count failed");
                        let _ = tx.send(SurfaceEvent::Error(format!("Unread count failed: {}", e)));
                    }
                }
            });
        }
        BackendAction::Quit => {
            close_session(session, event_tx);
            return false;
        }
    }
    true
}

/// Close the open session, if any. Returns whether one was open.
pub fn close_session<T: ChatTransport>(
    session: &mut Option<Session<T>>,
    event_tx: &Sender<SurfaceEvent>,
) -> bool {
    match session.take() {
        Some(mut s) => {
            s.close();
            let _ = event_tx.send(SurfaceEvent::Closed(s.conversation_id()));
            true
        }
        None => false,
    }
}
