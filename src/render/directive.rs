//! Slide-mode directive: `<!-- revealjs -->` or `<!-- revealjs:N -->` on
//! the first line switches output to reveal.js at slide level 2 or N.

use crate::convert::OutputFormat;

const DEFAULT_SLIDE_LEVEL: u8 = 2;

/// Detect the slide directive and strip its line from `content`.
pub fn split_slide_directive(content: &str) -> (OutputFormat, &str) {
    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
    match parse_directive(first.trim_end_matches('\r')) {
        Some(slide_level) => (OutputFormat::RevealJs { slide_level }, rest),
        None => (OutputFormat::Html5, content),
    }
}

fn parse_directive(line: &str) -> Option<u8> {
    let inner = line
        .strip_prefix("<!--")?
        .strip_suffix("-->")?
        .trim()
        .strip_prefix("revealjs")?;

    if inner.is_empty() {
        return Some(DEFAULT_SLIDE_LEVEL);
    }
    let level: u8 = inner.strip_prefix(':')?.trim().parse().ok()?;
    (1..=6).contains(&level).then_some(level)
}
