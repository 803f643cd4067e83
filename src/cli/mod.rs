//! Command-line interface module.

mod args;
pub mod send;
pub mod serve;
pub mod status;

pub use args::{Cli, Commands, ServerArgs};
