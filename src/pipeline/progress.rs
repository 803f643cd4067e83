//! Progress marker broadcast while a render job runs.
//!
//! After a grace period the reporter sends `{"status": " 🞄 "}`, then one
//! more marker per tick: `" 🞄  🞄 "`, and so on.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::{Hub, OutboundMessage};

const MARKER: &str = " 🞄 ";

/// Running progress ticker; stops on [`stop`](Self::stop) or drop.
pub struct ProgressReporter {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start ticking on the current runtime.
    pub fn start(hub: Arc<Hub>, grace: Duration, tick: Duration) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(tick_loop(hub, grace, tick, token.clone()));
        Self {
            token,
            task: Some(task),
        }
    }

    /// Stop ticking. Idempotent; no marker is sent after this returns.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop(hub: Arc<Hub>, grace: Duration, tick: Duration, token: CancellationToken) {
    tokio::select! {
        () = token.cancelled() => return,
        () = tokio::time::sleep(grace) => {}
    }

    let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
    for k in 1.. {
        tokio::select! {
            () = token.cancelled() => return,
            _ = interval.tick() => {}
        }
        if token.is_cancelled() {
            return;
        }
        hub.broadcast(&OutboundMessage::Status {
            status: MARKER.repeat(k),
        });
    }
}
