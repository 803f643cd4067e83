//! `panlive serve`: run the preview server until Ctrl+C.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;

use crate::config::PreviewConfig;
use crate::convert::Pandoc;
use crate::core::shutdown_signal;
use crate::error::PipelineError;
use crate::ingest::UpdateRequest;
use crate::ingest::pipe::PipeListener;
use crate::pipeline::Pipeline;
use crate::server::{HttpServer, WsServer};
use crate::{debug, log};

/// File in the runtime directory holding the WebSocket port.
const PORT_MARKER: &str = "websocket_port";

/// Check the converter, then serve on a single-threaded runtime.
pub fn run(config: &PreviewConfig) -> Result<()> {
    let pandoc = Pandoc::new(&config.render);
    let program = pandoc.ensure_available()?;
    debug!("serve"; "converter: {}", program.display());

    let shutdown = shutdown_signal().context("shutdown signal already taken")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(serve(config, Arc::new(pandoc), shutdown))
}

async fn serve(config: &PreviewConfig, pandoc: Arc<Pandoc>, shutdown: Receiver<()>) -> Result<()> {
    let pipeline = Pipeline::start(config, pandoc)?;

    let interface = config.serve.interface;
    let mut ws = WsServer::bind(interface, config.serve.port, pipeline.handle())?;
    let mut http = if config.serve.http {
        Some(HttpServer::bind(interface, config.serve.http_port(), pipeline.handle())?)
    } else {
        None
    };

    let pipe_path = config.serve.pipe_path();
    let handle = pipeline.handle();
    let mut pipe = PipeListener::spawn(pipe_path.clone(), move |frame| {
        handle.submit_update(UpdateRequest::pipe(frame));
    })
    .map_err(|e| PipelineError::Startup(format!("cannot create pipe {}: {e}", pipe_path.display())))?;

    let runtime_dir = config.serve.runtime_dir();
    let marker = write_port_marker(&runtime_dir, ws.port())
        .with_context(|| format!("cannot write port marker in {}", runtime_dir.display()))?;

    log!("serve"; "ws://{}", ws.addr());
    if let Some(http) = &http {
        log!("http"; "http://{}:{}", interface, http.port());
    }
    log!("pipe"; "{}", pipe.path().display());
    log!("serve"; "home {}", config.home().display());

    // Ctrl+C arrives on a std channel; wait for it off the runtime thread.
    let _ = tokio::task::spawn_blocking(move || shutdown.recv()).await;

    pipe.stop();
    if let Some(http) = http.as_mut() {
        http.stop();
    }
    ws.stop();
    pipeline.shutdown().await;

    if let Err(e) = fs::remove_file(&marker) {
        debug!("serve"; "failed to remove {}: {}", marker.display(), e);
    }
    Ok(())
}

/// Record the listening port for editor integrations.
pub fn write_port_marker(runtime_dir: &Path, port: u16) -> io::Result<PathBuf> {
    fs::create_dir_all(runtime_dir)?;
    let marker = runtime_dir.join(PORT_MARKER);
    fs::write(&marker, port.to_string())?;
    Ok(marker)
}

/// Port recorded by a running server, if any.
pub fn read_port_marker(runtime_dir: &Path) -> Option<u16> {
    fs::read_to_string(runtime_dir.join(PORT_MARKER))
        .ok()?
        .trim()
        .parse()
        .ok()
}
