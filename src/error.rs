//! Pipeline-level errors.

use thiserror::Error;

use crate::convert::ConvertError;
use crate::ingest::IngestError;

/// Failure of the update-to-render pipeline.
///
/// Everything except [`PipelineError::Startup`] is reported to viewers as
/// an `{error}` message and the pipeline keeps running.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Cannot bind, cannot create the FIFO, converter missing.
    #[error("startup failed: {0}")]
    Startup(String),
}
