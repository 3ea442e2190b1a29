//! Kongossa chat - terminal client for the Kongossa conversation service
//!
//! Architecture:
//! - Main thread: reads input lines (messages or /commands)
//! - Backend thread: runs a Tokio runtime for polling, history and sends
//! - Printer thread: renders surface events as they arrive
//! - Communication via crossbeam channels (lock-free, sync-safe)

use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::{unbounded, Receiver};

use kongossa_chat::backend::run_backend;
use kongossa_chat::commands::handle_user_command;
use kongossa_chat::config::{load_settings, save_settings, Settings};
use kongossa_chat::logging::init_logging;
use kongossa_chat::protocol::{BackendAction, SurfaceEvent};
use kongossa_chat::surface::{Bubble, MediaView, ReadReceipt};

fn main() {
    let log_path = init_logging();
    let mut settings = load_settings().unwrap_or_default();

    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<i64>() {
            Ok(id) => settings.last_conversation = Some(id),
            Err(_) => {
                eprintln!("usage: kongossa-chat [conversation-id]");
                std::process::exit(2);
            }
        }
    }

    if let Some(path) = &log_path {
        println!("Logging to {}", path.display());
    }
    tracing::info!(server = %settings.server_url, user = settings.current_user_id, "starting");

    let (action_tx, action_rx) = unbounded::<BackendAction>();
    let (event_tx, event_rx) = unbounded::<SurfaceEvent>();

    let backend_settings = settings.clone();
    let backend = thread::spawn(move || run_backend(action_rx, event_tx, backend_settings));
    let printer = {
        let settings = settings.clone();
        thread::spawn(move || print_events(event_rx, settings))
    };

    if let Some(id) = settings.last_conversation {
        let _ = action_tx.send(BackendAction::Open(id));
    } else {
        println!("Type /open <conversation-id> to start, /help for commands.");
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };

        let mut status = Vec::new();
        if handle_user_command(&line, &action_tx, &mut status) {
            for entry in status {
                println!("* {}", entry);
            }
            if matches!(line.trim(), "/quit" | "/exit") {
                break;
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }
        let _ = action_tx.send(BackendAction::Send {
            content: line,
            file: None,
        });
    }

    let _ = action_tx.send(BackendAction::Quit);
    drop(action_tx);
    let _ = backend.join();
    let _ = printer.join();
}

fn print_events(event_rx: Receiver<SurfaceEvent>, mut settings: Settings) {
    for event in event_rx.iter() {
        if let SurfaceEvent::Opened(id) = &event {
            settings.last_conversation = Some(*id);
            if let Err(e) = save_settings(&settings) {
                tracing::warn!(error = %e, "failed to save settings");
            }
        }
        if let Some(line) = render_event(&event) {
            println!("{}", line);
        }
    }
}

/// One printable line per event; layout-only events print nothing.
fn render_event(event: &SurfaceEvent) -> Option<String> {
    match event {
        SurfaceEvent::GroupAppended(group) | SurfaceEvent::GroupPrepended(group) => {
            Some(format!("-- {} · {}", group.sender_name, group.key.day))
        }
        SurfaceEvent::BubbleAppended { bubble, .. } => Some(render_bubble(bubble)),
        SurfaceEvent::BubblePrepended { bubble, .. } => Some(format!("^ {}", render_bubble(bubble))),
        SurfaceEvent::Opened(id) => Some(format!("* Opened conversation {}", id)),
        SurfaceEvent::Closed(id) => Some(format!("* Closed conversation {}", id)),
        SurfaceEvent::ReceiptRead(id) => Some(format!("  ✓✓ message {} read", id)),
        SurfaceEvent::HistoryExhausted => Some("* Start of conversation".to_string()),
        SurfaceEvent::UnreadCount(n) => Some(format!("* {} unread", n)),
        SurfaceEvent::Status(text) => Some(format!("* {}", text)),
        SurfaceEvent::Error(text) => Some(format!("! {}", text)),
        SurfaceEvent::BubbleRemoved(_)
        | SurfaceEvent::ScrolledToBottom { .. }
        | SurfaceEvent::ScrollCorrected(_) => None,
    }
}

fn render_bubble(bubble: &Bubble) -> String {
    let mut line = format!("  [{}] {}", bubble.time_label, bubble.text);
    match &bubble.media {
        Some(MediaView::Image { src }) => line.push_str(&format!(" <image {}>", src)),
        Some(MediaView::Video { src }) => line.push_str(&format!(" <video {}>", src)),
        Some(MediaView::Audio { src }) => line.push_str(&format!(" <audio {}>", src)),
        Some(MediaView::File {
            name,
            size_label,
            href,
        }) => line.push_str(&format!(" <{} ({}) {}>", name, size_label, href)),
        None => {}
    }
    if bubble.is_pending() {
        line.push_str(" (sending)");
    } else {
        match bubble.receipt {
            Some(ReadReceipt::Single) => line.push_str(" ✓"),
            Some(ReadReceipt::Double) => line.push_str(" ✓✓"),
            None => {}
        }
    }
    line
}
