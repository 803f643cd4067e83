//! Live viewer protocol.
//!
//! Server → client messages are bare JSON objects distinguished by their
//! fields; clients send short text commands.

use serde::Serialize;

use crate::render::HtmlBlock;

/// Message pushed to every connected viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// A rendered document.
    Document {
        /// Document path relative to home.
        filepath: String,
        /// `[hash, html]` pairs in document order.
        htmlblocks: Vec<HtmlBlock>,
        #[serde(rename = "suppress-bibliography")]
        suppress_bibliography: bool,
        #[serde(rename = "reference-section-title")]
        reference_section_title: String,
        /// Bibliography this document expects; `null` without citations.
        bibid: Option<String>,
    },

    /// Rendered bibliography for `bibid`.
    Bibliography { html: String, bibid: Option<String> },

    Error { error: String },

    /// Progress marker while a render is running.
    Status { status: String },
}

impl OutboundMessage {
    pub fn error(error: impl std::fmt::Display) -> Self {
        Self::Error {
            error: error.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client → server command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// `filepath:PATH`: render `HOME/PATH`.
    FilePath(String),
    /// Anything else: the viewer wants the current bibliography.
    Citations,
}

impl ClientRequest {
    pub fn parse(text: &str) -> Self {
        match text.strip_prefix("filepath:") {
            Some(path) => Self::FilePath(path.trim().to_string()),
            None => Self::Citations,
        }
    }
}
