//! `panlive send`: push a document into a running server's pipe.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::PreviewConfig;
use crate::debug;
use crate::ingest::pipe::write_frame;
use crate::ingest::with_filepath_directive;
use crate::utils::path::normalize_path;

pub fn run(config: &PreviewConfig, file: Option<&Path>, target: Option<&str>) -> Result<()> {
    let (content, default_target) = match file {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let target = normalize_path(path).to_string_lossy().into_owned();
            (content, Some(target))
        }
        None => {
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .context("failed to read stdin")?;
            (content, None)
        }
    };

    let frame = build_frame(&content, target.map(str::to_owned).or(default_target));
    let pipe = config.serve.pipe_path();
    write_frame(&pipe, frame.as_bytes()).with_context(|| {
        format!("cannot send to {} (is `panlive serve` running?)", pipe.display())
    })?;

    debug!("pipe"; "sent {} bytes to {}", frame.len(), pipe.display());
    Ok(())
}

/// Frame text for `content`: directive first when a target is named, with
/// NUL bytes removed since they delimit frames.
fn build_frame(content: &str, target: Option<String>) -> String {
    let content = content.replace('\0', "");
    match target {
        Some(target) => with_filepath_directive(&target, &content),
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_with_target() {
        assert_eq!(
            build_frame("# Hi", Some("notes/a.md".into())),
            "<!-- filepath:notes/a.md -->\n# Hi"
        );
    }

    #[test]
    fn test_frame_without_target_is_live_document() {
        assert_eq!(build_frame("# Hi", None), "# Hi");
    }

    #[test]
    fn test_frame_strips_nul() {
        assert_eq!(build_frame("a\0b", None), "ab");
    }
}
