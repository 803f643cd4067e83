//! Coalescing scheduler.
//!
//! Requests are resolved first (file reads on the blocking pool); a
//! request that fails to resolve only reports `{error}` and leaves the
//! running and pending jobs alone. At most one job runs at a time. Updates
//! arriving meanwhile go into a single pending slot (newest wins) and cancel
//! the running job, whose result is then discarded. The pending update starts once the settle
//! delay has passed since both the last accepted update and the last
//! completed job.
//!
//! ```text
//!            update (outside settle window)
//!   Idle ───────────────────────────────────▶ Running
//!    ▲  ╲ update (inside window): pending       │ update: cancel running,
//!    │   ╲                                      │         overwrite pending
//!    │    ▶ settle deadline ──▶ start pending   │
//!    └──────────────── job finished ◀───────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;

use super::job::{self, JobContext, JobId, JobOutput, JobStatus, RenderJob};
use super::progress::ProgressReporter;
use crate::config::ProgressConfig;
use crate::error::PipelineError;
use crate::hub::{Hub, OutboundMessage};
use crate::ingest::{IngestError, ResolvedUpdate, UpdateRequest};
use crate::logger::{status_error, status_success};
use crate::utils::plural::plural_count;

/// Messages to the scheduler task.
#[derive(Debug)]
pub enum SchedulerMsg {
    Update(UpdateRequest),
    Shutdown,
}

type JobResult = Result<Option<JobOutput>, PipelineError>;

/// Submission order of a request.
type Seq = u64;

type Resolution = (Seq, Result<ResolvedUpdate, IngestError>);

struct Running {
    job: RenderJob,
    task: JoinHandle<JobResult>,
    progress: ProgressReporter,
}

pub struct Scheduler {
    rx: mpsc::UnboundedReceiver<SchedulerMsg>,
    ctx: JobContext,
    hub: Arc<Hub>,
    settle: Duration,
    progress: ProgressConfig,
    next_id: JobId,
    next_seq: Seq,
    accepted_seq: Seq,
    resolving: JoinSet<Resolution>,
    running: Option<Running>,
    pending: Option<ResolvedUpdate>,
    last_accepted: Option<Instant>,
    last_completed: Option<Instant>,
}

impl Scheduler {
    pub fn new(
        rx: mpsc::UnboundedReceiver<SchedulerMsg>,
        ctx: JobContext,
        hub: Arc<Hub>,
        settle: Duration,
        progress: ProgressConfig,
    ) -> Self {
        Self {
            rx,
            ctx,
            hub,
            settle,
            progress,
            next_id: 1,
            next_seq: 0,
            accepted_seq: 0,
            resolving: JoinSet::new(),
            running: None,
            pending: None,
            last_accepted: None,
            last_completed: None,
        }
    }

    pub async fn run(mut self) {
        loop {
            let deadline = self.settle_deadline();
            let can_start = self.pending.is_some() && self.running.is_none();

            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(SchedulerMsg::Update(request)) => self.resolve(request),
                    Some(SchedulerMsg::Shutdown) | None => break,
                },
                Some(joined) = self.resolving.join_next() => match joined {
                    Ok(resolution) => self.resolved(resolution),
                    Err(e) => crate::debug!("pipeline"; "resolve task failed: {}", e),
                },
                result = wait_job(&mut self.running) => self.finish(result),
                () = tokio::time::sleep_until(deadline), if can_start => {
                    if let Some(update) = self.pending.take() {
                        self.start(update);
                    }
                }
            }
        }

        self.resolving.abort_all();
        if let Some(mut running) = self.running.take() {
            running.job.supersede();
            running.progress.stop();
            running.task.abort();
        }
        crate::debug!("pipeline"; "scheduler stopped");
    }

    /// Earliest instant the next job may start.
    fn settle_deadline(&self) -> Instant {
        match self.last_accepted.max(self.last_completed) {
            Some(last) => last + self.settle,
            None => Instant::now(),
        }
    }

    fn resolve(&mut self, request: UpdateRequest) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let resolver = self.ctx.resolver.clone();
        self.resolving.spawn(async move { (seq, resolver.resolve(request).await) });
    }

    fn resolved(&mut self, (seq, result): Resolution) {
        // a newer request was accepted while this one was being read
        if seq < self.accepted_seq {
            crate::debug!("pipeline"; "stale request {} dropped", seq);
            return;
        }
        match result {
            Ok(update) => {
                self.accepted_seq = seq;
                self.accept(update);
            }
            Err(e) => self.report_failure(&PipelineError::from(e).to_string()),
        }
    }

    fn accept(&mut self, update: ResolvedUpdate) {
        let now = Instant::now();
        let idle = self.running.is_none() && self.pending.is_none();
        let settled = now >= self.settle_deadline();
        self.last_accepted = Some(now);

        if let Some(running) = &mut self.running
            && !running.job.is_superseded()
        {
            crate::debug!("pipeline"; "job {} superseded", running.job.id);
            running.job.supersede();
            running.progress.stop();
        }

        if idle && settled {
            self.start(update);
            return;
        }
        if self.pending.replace(update).is_some() {
            crate::debug!("pipeline"; "pending update replaced");
        }
    }

    fn start(&mut self, update: ResolvedUpdate) {
        let mut job = RenderJob::new(self.next_id);
        self.next_id += 1;
        job.status = JobStatus::Running;
        crate::debug!("pipeline"; "job {} started ({})", job.id, update.display_path);

        let task = tokio::spawn(job::run(self.ctx.clone(), update, job.token.clone()));
        let progress = ProgressReporter::start(
            Arc::clone(&self.hub),
            self.progress.grace(),
            self.progress.tick(),
        );
        self.running = Some(Running {
            job,
            task,
            progress,
        });
    }

    fn finish(&mut self, result: Result<JobResult, JoinError>) {
        self.last_completed = Some(Instant::now());
        let Some(Running {
            mut job,
            mut progress,
            ..
        }) = self.running.take()
        else {
            return;
        };
        progress.stop();

        if job.is_superseded() {
            crate::debug!("pipeline"; "job {} result discarded", job.id);
            return;
        }

        job.status = match result {
            Ok(Ok(Some(output))) => {
                let summary = format!(
                    "rendered {} ({})",
                    output.display_path,
                    plural_count(output.document.blocks.len(), "block")
                );
                let report = self.hub.broadcast(&output.message());
                let cache = self.ctx.renderer.cache_stats();
                crate::debug!(
                    "pipeline";
                    "job {} delivered to {} clients (cache: {} hits, {} misses, {}/{} entries)",
                    job.id,
                    report.delivered,
                    cache.hits,
                    cache.misses,
                    cache.entries,
                    cache.capacity
                );
                status_success(&summary);
                JobStatus::Completed
            }
            // cancelled without a newer update: only during shutdown
            Ok(Ok(None)) => JobStatus::Superseded,
            Ok(Err(e)) => {
                self.report_failure(&e.to_string());
                JobStatus::Failed
            }
            Err(e) => {
                self.report_failure(&format!("render task failed: {e}"));
                JobStatus::Failed
            }
        };
        crate::debug!("pipeline"; "job {} {:?}", job.id, job.status);
    }

    fn report_failure(&self, error: &str) {
        status_error("render failed", error);
        self.hub.broadcast(&OutboundMessage::error(error));
    }
}

/// Wait for the running job; pending forever when idle.
async fn wait_job(running: &mut Option<Running>) -> Result<JobResult, JoinError> {
    match running {
        Some(current) => (&mut current.task).await,
        None => std::future::pending().await,
    }
}
