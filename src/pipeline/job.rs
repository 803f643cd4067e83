//! Render job: one accepted update, from resolved content to rendered document.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::biblio::Bibliography;
use crate::convert::ConvertError;
use crate::error::PipelineError;
use crate::hub::OutboundMessage;
use crate::ingest::{ResolvedUpdate, Resolver};
use crate::render::{RenderedDocument, Renderer};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    /// A newer update arrived; any result is discarded.
    Superseded,
    Completed,
    Failed,
}

/// Bookkeeping for one job, owned by the scheduler.
#[derive(Debug)]
pub struct RenderJob {
    pub id: JobId,
    pub status: JobStatus,
    pub token: CancellationToken,
}

impl RenderJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            token: CancellationToken::new(),
        }
    }

    pub fn supersede(&mut self) {
        self.token.cancel();
        self.status = JobStatus::Superseded;
    }

    pub fn is_superseded(&self) -> bool {
        self.status == JobStatus::Superseded
    }
}

/// Successful job result.
#[derive(Debug)]
pub struct JobOutput {
    pub display_path: String,
    pub document: RenderedDocument,
    pub bibid: Option<String>,
}

impl JobOutput {
    pub fn message(self) -> OutboundMessage {
        OutboundMessage::Document {
            filepath: self.display_path,
            htmlblocks: self.document.blocks,
            suppress_bibliography: self.document.suppress_bibliography,
            reference_section_title: self.document.reference_section_title,
            bibid: self.bibid,
        }
    }
}

/// Services a job needs; cheap to clone into the job task.
#[derive(Clone)]
pub struct JobContext {
    pub resolver: Resolver,
    pub renderer: Arc<Renderer>,
    pub bibliography: Bibliography,
}

/// Run one job. `Ok(None)` means it was cancelled.
pub async fn run(
    ctx: JobContext,
    resolved: ResolvedUpdate,
    token: CancellationToken,
) -> Result<Option<JobOutput>, PipelineError> {
    let Some(parsed) = ctx
        .renderer
        .parse(&resolved.content, &resolved.base_dir, &token)
        .await?
    else {
        return Ok(None);
    };

    let key = match parsed.citations() {
        Some(digest) => Some(
            tokio::task::spawn_blocking(move || digest.observe())
                .await
                .map_err(|e| ConvertError::Process(format!("bibliography task failed: {e}")))?,
        ),
        None => None,
    };
    if token.is_cancelled() {
        return Ok(None);
    }
    let bibid = key.as_ref().map(|k| k.bibid());
    ctx.bibliography.request(key);

    let Some(document) = ctx.renderer.render_parsed(&parsed, &token).await? else {
        return Ok(None);
    };

    Ok(Some(JobOutput {
        display_path: resolved.display_path,
        document,
        bibid,
    }))
}
