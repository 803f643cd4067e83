//! Process-wide state shared by the serve command.

mod state;

pub use state::{setup_shutdown_handler, shutdown_signal};
