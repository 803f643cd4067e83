use thiserror::Error;

/// Update that cannot be turned into a render input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("cannot decode {path}: input is not valid UTF-8")]
    Decode { path: String },

    #[error("cannot read {path}: {reason}")]
    MissingFile { path: String, reason: String },
}
