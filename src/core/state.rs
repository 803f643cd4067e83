//! Shutdown signalling for serve mode.
//!
//! Ctrl+C before the serve loop is listening exits the process; after
//! `shutdown_signal()` it wakes the loop, which stops the servers and
//! drains the pipeline.

use std::sync::OnceLock;

use crossbeam::channel::{Receiver, Sender};

/// Shutdown signal sender for the serve loop
static SHUTDOWN_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        if !request_shutdown() {
            std::process::exit(0);
        }
        crate::log!("serve"; "shutting down...");
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Receiver that yields once shutdown is requested.
///
/// Only the first caller gets a channel; later calls return `None`.
pub fn shutdown_signal() -> Option<Receiver<()>> {
    let (tx, rx) = crossbeam::channel::bounded(1);
    SHUTDOWN_TX.set(tx).ok().map(|()| rx)
}

/// Wake the serve loop. Returns whether one was listening.
pub fn request_shutdown() -> bool {
    SHUTDOWN_TX.get().is_some_and(|tx| {
        let _ = tx.try_send(());
        true
    })
}
