use thiserror::Error;

/// Failure of one converter invocation.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Process could not be spawned or exited non-zero.
    #[error("{0}")]
    Process(String),

    #[error("converter produced unparseable output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("converter produced non-UTF-8 output")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl From<anyhow::Error> for ConvertError {
    fn from(err: anyhow::Error) -> Self {
        Self::Process(format!("{err:#}"))
    }
}
