//! Converter client.
//!
//! The converter is a black box reached through three calls: markdown to
//! structured document, structured fragment to HTML, and citation digest to
//! bibliography HTML. Calls are blocking; the render pool runs them on
//! `spawn_blocking` threads.

mod document;
mod error;
mod pandoc;

pub use document::{Document, header_level, meta_items, meta_text, node_type};
pub use error::ConvertError;
pub use pandoc::Pandoc;

use std::path::Path;

/// HTML flavor for fragment conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Html5,
    /// reveal.js slides; sections split at the given heading level.
    RevealJs { slide_level: u8 },
}

impl OutputFormat {
    /// Converter arguments selecting this format.
    pub fn args(self) -> Vec<String> {
        match self {
            Self::Html5 => vec!["--to".into(), "html5".into()],
            Self::RevealJs { slide_level } => vec![
                "--to".into(),
                "revealjs".into(),
                "--slide-level".into(),
                slide_level.to_string(),
            ],
        }
    }

    pub const fn is_slides(self) -> bool {
        matches!(self, Self::RevealJs { .. })
    }
}

/// External document converter.
///
/// `base_dir` is the working directory of the call, so relative resources
/// (images, bibliography files, styles) resolve against the document.
pub trait Converter: Send + Sync + 'static {
    /// Markdown to structured document.
    fn to_document(&self, content: &str, base_dir: &Path) -> Result<Document, ConvertError>;

    /// Serialized structured fragment to HTML.
    ///
    /// `standalone` requests a full page; used for the title block.
    fn to_html(
        &self,
        fragment: &str,
        base_dir: &Path,
        format: OutputFormat,
        standalone: bool,
    ) -> Result<String, ConvertError>;

    /// Citation digest to bibliography HTML.
    fn to_bibliography(&self, digest: &str, base_dir: &Path) -> Result<String, ConvertError>;
}

#[cfg(test)]
pub mod testing;
