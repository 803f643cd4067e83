//! Update source adapter.
//!
//! Normalizes the three update origins (FIFO frames, viewer file-path
//! requests, HTTP submissions) into a document path, a base directory and
//! decoded content.

mod error;
pub mod pipe;

pub use error::IngestError;

use std::path::{Path, PathBuf};

use crate::utils::path::{display_relative, lexical_normalize, normalize_path};

/// Name of the anonymous live document inside home.
pub const LIVE_DOCUMENT: &str = "LIVE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Pipe,
    FilePathRequest,
    ClientSubmission,
}

/// Raw update as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub origin: Origin,
    pub raw: Vec<u8>,
    pub target: Option<PathBuf>,
}

impl UpdateRequest {
    /// A frame read from the FIFO; may start with a filepath directive.
    pub fn pipe(raw: Vec<u8>) -> Self {
        Self {
            origin: Origin::Pipe,
            raw,
            target: None,
        }
    }

    /// A viewer asking for `HOME/path`.
    pub fn file_path(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::FilePathRequest,
            raw: Vec::new(),
            target: Some(path.into()),
        }
    }

    /// Content submitted by a client, optionally naming its document.
    pub fn submission(raw: Vec<u8>, target: Option<PathBuf>) -> Self {
        Self {
            origin: Origin::ClientSubmission,
            raw,
            target,
        }
    }
}

/// Render input derived from an [`UpdateRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUpdate {
    pub document_path: PathBuf,
    /// Path shown to viewers: relative to home when inside it.
    pub display_path: String,
    pub base_dir: PathBuf,
    pub content: String,
}

/// Resolves update requests against the home directory.
#[derive(Debug, Clone)]
pub struct Resolver {
    home: PathBuf,
}

impl Resolver {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    #[cfg(test)]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Resolve a request. File reads run on the blocking pool.
    pub async fn resolve(&self, request: UpdateRequest) -> Result<ResolvedUpdate, IngestError> {
        match request.origin {
            Origin::FilePathRequest => {
                let target = request.target.unwrap_or_default();
                let resolver = self.clone();
                tokio::task::spawn_blocking(move || resolver.read_file(&target))
                    .await
                    .map_err(|e| IngestError::MissingFile {
                        path: String::new(),
                        reason: e.to_string(),
                    })?
            }
            Origin::Pipe | Origin::ClientSubmission => {
                let text = String::from_utf8(request.raw).map_err(|_| IngestError::Decode {
                    path: request
                        .target
                        .as_deref()
                        .map(|t| display_relative(t, &self.home))
                        .unwrap_or_else(|| "input".to_string()),
                })?;
                let (directive, content) = split_filepath_directive(&text);
                let target = request
                    .target
                    .or(directive)
                    .unwrap_or_else(|| PathBuf::from(LIVE_DOCUMENT));
                Ok(self.resolved(self.home.join(target), content.to_string()))
            }
        }
    }

    fn read_file(&self, target: &Path) -> Result<ResolvedUpdate, IngestError> {
        let shown = target.to_string_lossy().into_owned();
        let missing = |reason: String| IngestError::MissingFile {
            path: shown.clone(),
            reason,
        };

        let home = normalize_path(&self.home);
        let path = self
            .home
            .join(target)
            .canonicalize()
            .map_err(|e| missing(e.to_string()))?;
        if !path.starts_with(&home) {
            return Err(missing("outside the home directory".into()));
        }
        if !path.is_file() {
            return Err(missing("not a regular file".into()));
        }

        let bytes = std::fs::read(&path).map_err(|e| missing(e.to_string()))?;
        let content = String::from_utf8(bytes).map_err(|_| IngestError::Decode {
            path: shown.clone(),
        })?;
        Ok(self.resolved(path, content))
    }

    fn resolved(&self, path: PathBuf, content: String) -> ResolvedUpdate {
        let document_path = lexical_normalize(&path);
        let base_dir = document_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.home.clone());
        ResolvedUpdate {
            display_path: display_relative(&document_path, &self.home),
            document_path,
            base_dir,
            content,
        }
    }
}

/// Split a leading filepath directive off `text`.
///
/// Accepts `<!-- filepath:PATH -->` and `filepath directive: PATH` as the
/// first line.
pub fn split_filepath_directive(text: &str) -> (Option<PathBuf>, &str) {
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    let first = first.trim_end_matches('\r');

    let path = first
        .strip_prefix("<!-- filepath:")
        .and_then(|p| p.strip_suffix("-->"))
        .or_else(|| first.strip_prefix("filepath directive:"))
        .map(str::trim)
        .filter(|p| !p.is_empty());

    match path {
        Some(p) => (Some(PathBuf::from(p)), rest),
        None => (None, text),
    }
}

/// Frame content with a directive naming `target`.
pub fn with_filepath_directive(target: &str, content: &str) -> String {
    format!("<!-- filepath:{target} -->\n{content}")
}
