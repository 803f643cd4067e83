//! Update-to-render pipeline.
//!
//! # Architecture
//!
//! ```text
//! FIFO / viewer / HTTP
//!         │ submit_update
//!         ▼
//!    Resolver ─▶ Scheduler ──job──▶ Renderer (parse, units ∥ cache)
//!                    │                  │
//!                    │                  └──BibKey──▶ Bibliography task
//!                    ▼                               │
//!                   Hub ◀──────── {html, bibid} ──────┘
//!                    │
//!                    ▼
//!                 clients
//! ```
//!
//! All orchestration runs as tokio tasks on the caller's runtime; converter
//! calls run on the blocking pool. [`PipelineHandle`] is the thread-safe
//! entry point used by server threads.

mod job;
mod progress;
mod scheduler;

use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::biblio::Bibliography;
use crate::config::PreviewConfig;
use crate::convert::Converter;
use crate::error::PipelineError;
use crate::hub::{ClientHandle, ClientId, ClientRequest, Hub};
use crate::ingest::{Resolver, UpdateRequest};
use crate::render::Renderer;
#[cfg(test)]
use crate::cache::CacheStats;
use job::JobContext;
use scheduler::{Scheduler, SchedulerMsg};

/// Cloneable, thread-safe access to a running pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<SchedulerMsg>,
    hub: Arc<Hub>,
    bibliography: Bibliography,
}

impl PipelineHandle {
    /// Queue an update for rendering.
    pub fn submit_update(&self, request: UpdateRequest) {
        if self.tx.send(SchedulerMsg::Update(request)).is_err() {
            crate::debug!("pipeline"; "update dropped: pipeline stopped");
        }
    }

    pub fn register_client(&self) -> ClientHandle {
        self.hub.connect()
    }

    pub fn unregister_client(&self, id: ClientId) {
        self.hub.unregister(id);
    }

    /// Dispatch a text message received from a viewer.
    pub fn handle_client_request(&self, text: &str) {
        match ClientRequest::parse(text) {
            ClientRequest::FilePath(path) => {
                crate::debug!("pipeline"; "viewer requested {}", path);
                self.submit_update(UpdateRequest::file_path(path));
            }
            ClientRequest::Citations => self.bibliography.resend(),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

/// Running pipeline; owns the background tasks.
pub struct Pipeline {
    handle: PipelineHandle,
    #[cfg(test)]
    renderer: Arc<Renderer>,
    scheduler: JoinHandle<()>,
    bibliography: JoinHandle<()>,
}

impl Pipeline {
    /// Start the scheduler and bibliography tasks on the current runtime.
    pub fn start(
        config: &PreviewConfig,
        converter: Arc<dyn Converter>,
    ) -> Result<Self, PipelineError> {
        let capacity = NonZeroUsize::new(config.render.cache_capacity).ok_or_else(|| {
            PipelineError::Startup("render.cache_capacity must be at least 1".into())
        })?;

        let hub = Arc::new(Hub::default());
        let (bibliography, bib_task) =
            Bibliography::spawn(Arc::clone(&converter), Arc::clone(&hub), capacity);
        let renderer = Arc::new(Renderer::new(
            converter,
            capacity,
            config.render.worker_count(),
        ));

        let ctx = JobContext {
            resolver: Resolver::new(config.home()),
            renderer: Arc::clone(&renderer),
            bibliography: bibliography.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            rx,
            ctx,
            Arc::clone(&hub),
            config.render.settle(),
            config.progress.clone(),
        );
        let scheduler = tokio::spawn(scheduler.run());

        crate::debug!(
            "pipeline";
            "started (workers: {}, cache: {})",
            config.render.worker_count(),
            capacity
        );

        Ok(Self {
            handle: PipelineHandle {
                tx,
                hub,
                bibliography,
            },
            #[cfg(test)]
            renderer,
            scheduler,
            bibliography: bib_task,
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    #[cfg(test)]
    pub fn cache_stats(&self) -> CacheStats {
        self.renderer.cache_stats()
    }

    /// Stop accepting updates and wait for the background tasks.
    pub async fn shutdown(self) {
        let _ = self.handle.tx.send(SchedulerMsg::Shutdown);
        self.handle.bibliography.shutdown();
        if let Err(e) = self.scheduler.await {
            crate::debug!("pipeline"; "scheduler ended abnormally: {}", e);
        }
        if let Err(e) = self.bibliography.await {
            crate::debug!("pipeline"; "bibliography ended abnormally: {}", e);
        }
    }
}

impl Deref for Pipeline {
    type Target = PipelineHandle;

    fn deref(&self) -> &PipelineHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests;
