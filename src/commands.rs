//! Slash command handling (/open, /more, /file, etc.).

use std::path::PathBuf;

use crossbeam_channel::Sender;

use crate::protocol::BackendAction;

/// Handle user commands starting with '/'.
/// Returns true if the input was a command (and should be cleared), false otherwise.
pub fn handle_user_command(
    message_input: &str,
    action_tx: &Sender<BackendAction>,
    status_log: &mut Vec<String>,
) -> bool {
    let s = message_input.trim();
    let Some(cmdline) = s.strip_prefix('/') else {
        return false;
    };

    let mut parts = cmdline.split_whitespace();
    let cmd = parts.next().unwrap_or("").to_lowercase();

    match cmd.as_str() {
        "open" | "o" => match parts.next().map(str::parse::<i64>) {
            Some(Ok(id)) => {
                let _ = action_tx.send(BackendAction::Open(id));
            }
            Some(Err(_)) => status_log.push("Conversation id must be a number".into()),
            None => status_log.push("Usage: /open <conversation-id>".into()),
        },
        "close" => {
            let _ = action_tx.send(BackendAction::Close);
        }
        "more" | "m" => {
            let _ = action_tx.send(BackendAction::ScrolledToTop);
        }
        "file" | "f" => {
            if let Some(path) = parts.next() {
                let caption = parts.collect::<Vec<_>>().join(" ");
                let _ = action_tx.send(BackendAction::Send {
                    content: caption,
                    file: Some(PathBuf::from(path)),
                });
            } else {
                status_log.push("Usage: /file <path> [caption]".into());
            }
        }
        "unread" => {
            let _ = action_tx.send(BackendAction::UnreadCount);
        }
        "quit" | "exit" => {
            let _ = action_tx.send(BackendAction::Quit);
        }
        "help" => {
            status_log.push("Supported commands: /open, /close, /more, /file, /unread, /quit".into());
        }
        unknown => {
            status_log.push(format!("Unknown command: /{}", unknown));
        }
    }
    true
}
