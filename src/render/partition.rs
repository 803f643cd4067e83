//! Partition a parsed document into independently rendered units.

use serde_json::Value;

use crate::convert::{OutputFormat, header_level, node_type};

/// One independently converted piece of a document: a single top-level
/// block, or a slide section in slide mode.
pub type RenderUnit = Vec<Value>;

/// Split top-level blocks into render units, preserving order.
pub fn partition(blocks: &[Value], format: OutputFormat) -> Vec<RenderUnit> {
    match format {
        OutputFormat::Html5 => blocks.iter().map(|b| vec![b.clone()]).collect(),
        OutputFormat::RevealJs { slide_level } => group_sections(blocks, slide_level),
    }
}

/// Group blocks into slide sections.
///
/// A level-1 header opens a new section. At slide level 1 a horizontal
/// rule also closes the current section and is itself dropped.
fn group_sections(blocks: &[Value], slide_level: u8) -> Vec<RenderUnit> {
    let mut sections = Vec::new();
    let mut current: RenderUnit = Vec::new();

    for block in blocks {
        if slide_level == 1 && node_type(block) == Some("HorizontalRule") {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
        } else if header_level(block) == Some(1) {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            current.push(block.clone());
        } else {
            current.push(block.clone());
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}
