//! Backend event loop driving chat sessions from UI actions.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tokio::runtime::Runtime;

use crate::backend::session::SessionOptions;
use crate::config::Settings;
use crate::protocol::{BackendAction, SurfaceEvent};
use crate::transport::HttpTransport;

/// Run the backend event loop on a tokio runtime
pub fn run_backend(action_rx: Receiver<BackendAction>, event_tx: Sender<SurfaceEvent>, settings: Settings) {
    // Create a Tokio runtime for this thread
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = event_tx.send(SurfaceEvent::Error(format!(
                "Failed to create Tokio runtime: {}",
                e
            )));
            return;
        }
    };

    let transport = match HttpTransport::new(&settings) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!(error = %e, "cannot build http transport");
            let _ = event_tx.send(SurfaceEvent::Error(e.to_string()));
            return;
        }
    };
    let options = SessionOptions::from_settings(&settings);

    rt.block_on(async move {
        let mut session = None;

        loop {
            // Check for actions from the UI (non-blocking)
            match action_rx.try_recv() {
                Ok(action) => {
                    let keep_running = handlers::handle_backend_action(
                        action,
                        &mut session,
                        &transport,
                        &options,
                        &event_tx,
                    )
                    .await;
                    if !keep_running {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => {
                    // Nothing to do; poll and history tasks run meanwhile
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(TryRecvError::Disconnected) => {
                    handlers::close_session(&mut session, &event_tx);
                    break;
                }
            }
        }
    });

    tracing::info!("backend stopped");
}
