//! Recurring fetch of new messages for the open conversation.
//!
//! `Idle -> Active -> Idle`. Starting replaces any running loop. Each tick
//! claims the poll slot in the sync state, so a slow request makes later ticks
//! skip instead of overlapping. Stopping cancels the timer only: a request
//! already in flight finishes, and its result is dropped by the epoch check.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::surface::PresentationSurface;
use crate::transport::ChatTransport;

use super::view::{lock_view, SharedView};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another fetch is outstanding, or the loop is no longer current.
    Skipped,
    /// Confirmed ids accepted this tick (possibly none).
    Applied(Vec<i64>),
    /// The loop was stopped while the request was in flight.
    Stale,
    Failed,
}

struct ActiveLoop {
    epoch: u64,
    token: CancellationToken,
}

pub struct PollLoop<T, S> {
    view: SharedView<S>,
    transport: Arc<T>,
    interval: Duration,
    active: Option<ActiveLoop>,
}

impl<T, S> PollLoop<T, S>
where
    T: ChatTransport,
    S: PresentationSurface + 'static,
{
    pub fn new(view: SharedView<S>, transport: Arc<T>, interval: Duration) -> Self {
        Self {
            view,
            transport,
            interval,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Epoch of the running loop, if any.
    pub fn epoch(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.epoch)
    }

    /// Start polling. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();

        let (epoch, conversation_id) = {
            let mut view = lock_view(&self.view);
            if view.state().is_closed() {
                return;
            }
            let epoch = view.state_mut().begin_polling();
            if let Some(latest) = view.latest_rendered_confirmed() {
                view.state_mut().advance_watermark(latest);
            }
            (epoch, view.conversation_id())
        };

        let token = CancellationToken::new();
        tokio::spawn(run_loop(
            self.view.clone(),
            self.transport.clone(),
            self.interval,
            epoch,
            token.clone(),
        ));
        tracing::info!(conversation_id, epoch, interval_ms = self.interval.as_millis() as u64, "polling started");

        self.active = Some(ActiveLoop { epoch, token });
    }

    /// Stop polling. Safe to call when idle.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            tracing::info!(epoch = active.epoch, "polling stopped");
        }
        lock_view(&self.view).state_mut().stop_polling();
    }
}

impl<T, S> Drop for PollLoop<T, S> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
        }
    }
}

async fn run_loop<T, S>(
    view: SharedView<S>,
    transport: Arc<T>,
    period: Duration,
    epoch: u64,
    token: CancellationToken,
) where
    T: ChatTransport,
    S: PresentationSurface + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The fetch runs on its own task so a slow response never holds the timer.
        let claimed = lock_view(&view).state_mut().try_begin_poll(epoch);
        if claimed {
            tokio::spawn(fetch_and_apply(view.clone(), transport.clone(), epoch));
        } else {
            tracing::trace!(epoch, "poll tick skipped");
        }
    }
}

/// One poll tick against a slot already claimed with `try_begin_poll`.
async fn fetch_and_apply<T, S>(view: SharedView<S>, transport: Arc<T>, epoch: u64) -> TickOutcome
where
    T: ChatTransport,
    S: PresentationSurface + 'static,
{
    let (conversation_id, after) = {
        let view = lock_view(&view);
        (view.conversation_id(), view.state().watermark())
    };

    let result = transport.fetch_new(conversation_id, after).await;

    let mut guard = lock_view(&view);
    guard.state_mut().end_poll(epoch);
    let batch = match result {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(conversation_id, error = %e, transient = e.is_transient(), "poll failed");
            return TickOutcome::Failed;
        }
    };

    let Some(accepted) = guard.apply_poll(epoch, &batch) else {
        tracing::debug!(conversation_id, epoch, "discarding stale poll result");
        return TickOutcome::Stale;
    };
    drop(guard);

    if !accepted.is_empty() {
        tracing::debug!(conversation_id, count = accepted.len(), "new messages rendered");
    }
    for &message_id in &accepted {
        let transport = transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.mark_read(message_id).await {
                tracing::warn!(message_id, error = %e, "mark read failed");
            }
        });
    }
    TickOutcome::Applied(accepted)
}

/// Run a single tick immediately, outside the timer.
pub async fn poll_once<T, S>(view: &SharedView<S>, transport: &Arc<T>, epoch: u64) -> TickOutcome
where
    T: ChatTransport,
    S: PresentationSurface + 'static,
{
    if !lock_view(view).state_mut().try_begin_poll(epoch) {
        return TickOutcome::Skipped;
    }
    fetch_and_apply(view.clone(), transport.clone(), epoch).await
}
