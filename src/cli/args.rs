//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::MathMode;

/// Live preview server for pandoc markdown
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: panlive.toml)
    #[arg(short = 'C', long, global = true, default_value = "panlive.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the preview server
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Send a document to a running server through its pipe
    Send {
        #[command(flatten)]
        server: ServerArgs,

        /// File to send (reads stdin when omitted)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: Option<PathBuf>,

        /// Document path to render as (default: FILE, or the live document)
        #[arg(long = "as", value_name = "PATH")]
        target: Option<String>,
    },

    /// Report whether a server is listening
    Status {
        #[command(flatten)]
        server: ServerArgs,
    },
}

/// Server settings shared by all commands; each overrides `panlive.toml`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Home directory for document paths
    #[arg(long, env = "PANLIVE_HOME", value_hint = clap::ValueHint::DirPath)]
    pub home: Option<PathBuf>,

    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(short, long, env = "PANLIVE_INTERFACE")]
    pub interface: Option<IpAddr>,

    /// WebSocket port (HTTP submission listens on port + 1)
    #[arg(short, long, env = "PANLIVE_PORT")]
    pub port: Option<u16>,

    /// Directory holding the pipe and port marker
    #[arg(long, env = "PANLIVE_RUNTIME_DIR", value_hint = clap::ValueHint::DirPath)]
    pub runtime_dir: Option<PathBuf>,

    /// Math rendering (mathml, katex)
    #[arg(long, env = "PANLIVE_MATH")]
    pub math: Option<MathMode>,

    /// Pandoc binary
    #[arg(long, env = "PANLIVE_PANDOC", value_hint = clap::ValueHint::ExecutablePath)]
    pub pandoc: Option<PathBuf>,
}

impl Commands {
    pub fn server_args(&self) -> &ServerArgs {
        match self {
            Self::Serve { server } | Self::Send { server, .. } | Self::Status { server } => server,
        }
    }
}
