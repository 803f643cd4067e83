//! Structured document: the pandoc JSON AST.
//!
//! Blocks and metadata stay as `serde_json::Value`; the pipeline only needs
//! to inspect a handful of node shapes (`Header`, `HorizontalRule`, `Cite`,
//! `MetaBool`, `MetaInlines`) and to re-serialize subsets for the converter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TITLE_KEYS: [&str; 4] = ["title", "subtitle", "author", "date"];

/// Parsed document as returned by the structured-conversion pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "pandoc-api-version")]
    pub api_version: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub blocks: Vec<Value>,
}

impl Document {
    /// Parse converter JSON output.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize a standalone document holding only `blocks`.
    ///
    /// Field order is fixed, so equal blocks give byte-equal fragments.
    pub fn fragment(&self, blocks: &[Value]) -> String {
        self.with_meta(blocks, Map::new())
    }

    /// Serialize a metadata-only document for title block rendering.
    ///
    /// Returns `None` when no title-related field is present.
    pub fn title_fragment(&self) -> Option<String> {
        let meta: Map<String, Value> = TITLE_KEYS
            .iter()
            .filter_map(|k| self.meta.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect();
        if meta.is_empty() {
            return None;
        }
        Some(self.with_meta(&[], meta))
    }

    fn with_meta(&self, blocks: &[Value], meta: Map<String, Value>) -> String {
        let mut doc = Map::new();
        doc.insert("blocks".into(), Value::Array(blocks.to_vec()));
        doc.insert("meta".into(), Value::Object(meta));
        doc.insert("pandoc-api-version".into(), self.api_version.clone());
        Value::Object(doc).to_string()
    }

    /// `MetaBool` value of a metadata key; absent or non-boolean is `false`.
    pub fn meta_bool(&self, key: &str) -> bool {
        self.meta
            .get(key)
            .filter(|v| node_type(v) == Some("MetaBool"))
            .and_then(|v| v.get("c"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Plain text of a metadata key.
    pub fn meta_text(&self, key: &str) -> Option<String> {
        self.meta.get(key).and_then(meta_text)
    }
}

/// Node tag (`"t"`) of an AST node.
pub fn node_type(node: &Value) -> Option<&str> {
    node.get("t").and_then(Value::as_str)
}

/// Level of a `Header` block, `None` for any other block.
pub fn header_level(block: &Value) -> Option<u64> {
    if node_type(block) != Some("Header") {
        return None;
    }
    block.get("c")?.get(0)?.as_u64()
}

/// Flatten a metadata value to plain text.
///
/// Handles `MetaString`, `MetaInlines` and bare inline lists; other
/// shapes yield `None`.
pub fn meta_text(value: &Value) -> Option<String> {
    match node_type(value) {
        Some("MetaString") => value.get("c")?.as_str().map(str::to_string),
        Some("MetaInlines") => {
            let text = inlines_text(value.get("c")?.as_array()?);
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

/// Items of a `MetaList`, or the value itself for a scalar.
pub fn meta_items(value: &Value) -> Vec<&Value> {
    match node_type(value) {
        Some("MetaList") => value
            .get("c")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        _ => vec![value],
    }
}

fn inlines_text(inlines: &[Value]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match node_type(inline) {
            Some("Str") => {
                if let Some(s) = inline.get("c").and_then(Value::as_str) {
                    out.push_str(s);
                }
            }
            Some("Space") | Some("SoftBreak") | Some("LineBreak") => out.push(' '),
            Some("Emph") | Some("Strong") | Some("Span") | Some("SmallCaps") => {
                // Span carries [attr, inlines]; the others carry inlines
                let children = inline.get("c").and_then(|c| {
                    c.as_array().and_then(|a| match a.last() {
                        Some(Value::Array(inner)) if node_type(inline) == Some("Span") => {
                            Some(inner.as_slice())
                        }
                        _ => Some(a.as_slice()),
                    })
                });
                if let Some(children) = children {
                    out.push_str(&inlines_text(children));
                }
            }
            _ => {}
        }
    }
    out
}
