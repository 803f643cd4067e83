//! Citation digest: the subset of a document that determines its
//! bibliography, plus the files it references.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::convert::{Document, meta_items, meta_text, node_type};
use crate::freshness::FileStamp;
use crate::utils::hash;

/// Metadata keys that influence bibliography output.
const BIB_META_KEYS: [&str; 5] = ["bibliography", "csl", "link-citations", "nocite", "references"];

/// Canonical citation input of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CitationDigest {
    /// Canonical JSON handed to the citation processor.
    pub json: String,
    pub base_dir: PathBuf,
    pub bibliography: Vec<PathBuf>,
    pub csl: Option<PathBuf>,
}

impl CitationDigest {
    /// Extract the digest, or `None` when the document carries no
    /// citation metadata.
    pub fn extract(doc: &Document, base_dir: &Path) -> Option<Self> {
        let meta: BTreeMap<&str, &Value> = BIB_META_KEYS
            .iter()
            .filter_map(|k| doc.meta.get(*k).map(|v| (*k, v)))
            .collect();
        if meta.is_empty() {
            return None;
        }

        let mut cites = Vec::new();
        doc.blocks.iter().for_each(|b| collect_cites(b, &mut cites));
        let blocks: Vec<Value> = cites
            .into_iter()
            .map(|cite| json!({"t": "Para", "c": [cite]}))
            .collect();

        let bibliography = meta
            .get("bibliography")
            .map(|v| {
                meta_items(v)
                    .into_iter()
                    .filter_map(meta_text)
                    .map(|p| base_dir.join(p))
                    .collect()
            })
            .unwrap_or_default();
        let csl = meta
            .get("csl")
            .and_then(|v| meta_text(v))
            .map(|p| base_dir.join(p));

        let json = json!({
            "blocks": blocks,
            "meta": meta,
            "pandoc-api-version": doc.api_version,
        })
        .to_string();

        Some(Self {
            json,
            base_dir: base_dir.to_path_buf(),
            bibliography,
            csl,
        })
    }

    /// Stat the referenced files and build the bibliography key.
    ///
    /// Touches the filesystem; call off the orchestration thread.
    pub fn observe(self) -> BibKey {
        let stamps = self
            .bibliography
            .iter()
            .cloned()
            .map(FileStamp::observe)
            .collect();
        let csl = self.csl.clone().map(FileStamp::observe);
        BibKey {
            digest: self,
            stamps,
            csl,
        }
    }
}

/// Every `Cite` inline in document order, at any depth.
fn collect_cites(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if node_type(value) == Some("Cite") {
                out.push(value.clone());
            } else {
                map.values().for_each(|v| collect_cites(v, out));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_cites(v, out)),
        _ => {}
    }
}

/// Identity of a bibliography: digest plus the mtimes of every file it
/// references. Any mtime change yields a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BibKey {
    pub digest: CitationDigest,
    pub stamps: Vec<FileStamp>,
    pub csl: Option<FileStamp>,
}

impl BibKey {
    /// Fingerprint sent to clients as `bibid`.
    pub fn bibid(&self) -> String {
        let mut text = String::with_capacity(self.digest.json.len() + 64);
        text.push_str(&self.digest.json);
        text.push('\0');
        text.push_str(&self.digest.base_dir.to_string_lossy());
        for stamp in self.stamps.iter().chain(&self.csl) {
            text.push('\0');
            text.push_str(&stamp.path.to_string_lossy());
            text.push('@');
            match stamp.nanos() {
                Some(n) => text.push_str(&n.to_string()),
                None => text.push('-'),
            }
        }
        hash::digest_hex(&text)
    }
}
