//! Scripted in-memory converter for tests.
//!
//! Understands a tiny line-based markup:
//!
//! ```text
//! % Title              -> meta title
//! bibliography: a.bib  -> meta bibliography
//! csl: style.csl       -> meta csl
//! # Heading            -> level-1 header (## for level 2, ...)
//! ---                  -> horizontal rule
//! <raw html>           -> raw html block
//! [@key]               -> paragraph holding one citation
//! slow:MS text         -> paragraph whose html conversion sleeps MS
//! FAIL                 -> structured conversion fails
//! anything else        -> paragraph
//! ```
//!
//! A leading `wait:MS` line delays the structured conversion itself.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use super::{ConvertError, Converter, Document, OutputFormat, header_level, node_type};

#[derive(Default)]
pub struct ScriptedConverter {
    pub parse_calls: AtomicUsize,
    pub html_calls: AtomicUsize,
    pub bib_calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Marks one converter call in flight.
struct InFlight<'a>(&'a ScriptedConverter);

impl<'a> InFlight<'a> {
    fn enter(conv: &'a ScriptedConverter) -> Self {
        let now = conv.active.fetch_add(1, Ordering::SeqCst) + 1;
        conv.peak.fetch_max(now, Ordering::SeqCst);
        Self(conv)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parses(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn htmls(&self) -> usize {
        self.html_calls.load(Ordering::SeqCst)
    }

    pub fn bibs(&self) -> usize {
        self.bib_calls.load(Ordering::SeqCst)
    }

    /// Highest number of converter calls seen running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn text(s: &str) -> Value {
    json!([{"t": "Str", "c": s}])
}

fn meta_inlines(s: &str) -> Value {
    json!({"t": "MetaInlines", "c": text(s)})
}

fn inline_text(block: &Value) -> String {
    let inlines = match node_type(block) {
        Some("Header") => block["c"][2].clone(),
        _ => block["c"].clone(),
    };
    inlines
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| match node_type(i) {
                    Some("Str") => i["c"].as_str().map(str::to_string),
                    Some("Cite") => Some(format!("cite:{}", i["c"][0][0]["citationId"].as_str().unwrap_or(""))),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

impl Converter for ScriptedConverter {
    fn to_document(&self, content: &str, _base_dir: &Path) -> Result<Document, ConvertError> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(self);

        let mut meta = serde_json::Map::new();
        let mut blocks = Vec::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(ms) = line.strip_prefix("wait:") {
                std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
            } else if line == "FAIL" {
                return Err(ConvertError::Process("scripted failure".into()));
            } else if let Some(title) = line.strip_prefix("% ") {
                meta.insert("title".into(), meta_inlines(title));
            } else if let Some(bib) = line.strip_prefix("bibliography: ") {
                meta.insert("bibliography".into(), meta_inlines(bib));
            } else if let Some(csl) = line.strip_prefix("csl: ") {
                meta.insert("csl".into(), meta_inlines(csl));
            } else if line == "suppress-bibliography" {
                meta.insert("suppress-bibliography".into(), json!({"t": "MetaBool", "c": true}));
            } else if line == "---" {
                blocks.push(json!({"t": "HorizontalRule"}));
            } else if line.starts_with('#') {
                let level = line.chars().take_while(|c| *c == '#').count();
                let title = line[level..].trim();
                blocks.push(json!({"t": "Header", "c": [level, ["", [], []], text(title)]}));
            } else if line.starts_with('<') {
                blocks.push(json!({"t": "RawBlock", "c": ["html", line]}));
            } else if let Some(key) = line.strip_prefix("[@").and_then(|l| l.strip_suffix(']')) {
                blocks.push(json!({"t": "Para", "c": [{"t": "Cite", "c": [
                    [{"citationId": key, "citationPrefix": [], "citationSuffix": [],
                      "citationMode": {"t": "NormalCitation"}, "citationNoteNum": 1,
                      "citationHash": 0}],
                    text(&format!("[@{key}]")),
                ]}]}));
            } else {
                blocks.push(json!({"t": "Para", "c": text(line)}));
            }
        }

        Ok(Document {
            api_version: json!([1, 23, 1]),
            meta,
            blocks,
        })
    }

    fn to_html(
        &self,
        fragment: &str,
        _base_dir: &Path,
        format: OutputFormat,
        standalone: bool,
    ) -> Result<String, ConvertError> {
        self.html_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(self);
        let doc = Document::from_json(fragment)?;

        if standalone {
            let title = doc.meta_text("title").unwrap_or_default();
            return Ok(if format.is_slides() {
                format!(
                    "<html><body><section id=\"title-slide\">\n<h1 class=\"title\">{title}</h1>\n</section>\n</body></html>"
                )
            } else {
                format!(
                    "<html><body><header id=\"title-block-header\">\n<h1 class=\"title\">{title}</h1>\n</header>\n</body></html>"
                )
            });
        }

        let mut html = String::new();
        for block in &doc.blocks {
            let body = inline_text(block);
            if let Some(ms) = body.strip_prefix("slow:") {
                let ms = ms.split_whitespace().next().unwrap_or("0");
                std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
            }
            match node_type(block) {
                Some("Header") => {
                    let level = header_level(block).unwrap_or(1);
                    html.push_str(&format!("<h{level}>{body}</h{level}>\n"));
                }
                Some("HorizontalRule") => html.push_str("<hr />\n"),
                Some("RawBlock") => {
                    html.push_str(block["c"][1].as_str().unwrap_or(""));
                    html.push('\n');
                }
                _ => html.push_str(&format!("<p>{body}</p>\n")),
            }
        }
        if format.is_slides() {
            html = format!("<section>\n{html}</section>\n");
        }
        Ok(html)
    }

    fn to_bibliography(&self, digest: &str, _base_dir: &Path) -> Result<String, ConvertError> {
        self.bib_calls.fetch_add(1, Ordering::SeqCst);
        let doc = Document::from_json(digest)?;
        Ok(format!("<div id=\"refs\">{} cited</div>", doc.blocks.len()))
    }
}
