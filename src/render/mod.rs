//! Document rendering: parse once, partition, convert units in parallel
//! through the block cache.
//!
//! ```text
//! content ─▶ slide directive ─▶ to_document ─▶ partition ─┬─▶ unit 0 ─┐
//!                                                          ├─▶ unit 1 ─┼─▶ ordered htmlblocks
//!                                                          └─▶ unit n ─┘
//!                                   (title block, if any, is unit 0)
//! ```

mod directive;
mod partition;
mod rewrite;

pub use directive::split_slide_directive;
pub use partition::partition;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::biblio::CitationDigest;
use crate::cache::{CacheStats, SharedCache};
use crate::convert::{ConvertError, Converter, Document, OutputFormat};
use crate::utils::hash;

/// Rendered unit as sent to clients: `[hash, html]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HtmlBlock(pub String, pub String);

impl HtmlBlock {
    pub fn new(html: String) -> Self {
        Self(hash::fingerprint(&html), html)
    }

    #[cfg(test)]
    pub fn hash(&self) -> &str {
        &self.0
    }

    pub fn html(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UnitKind {
    Block,
    Title,
}

/// Block cache key. The serialized fragment is the unit's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlockKey {
    fragment: Arc<str>,
    base_dir: Arc<Path>,
    format: OutputFormat,
    kind: UnitKind,
}

/// Document after the structured-conversion pass.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub format: OutputFormat,
    pub document: Document,
    pub base_dir: PathBuf,
}

impl ParsedDocument {
    /// Citation input, `None` when the document has no citation metadata.
    pub fn citations(&self) -> Option<CitationDigest> {
        CitationDigest::extract(&self.document, &self.base_dir)
    }
}

/// Result of rendering one document.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub format: OutputFormat,
    pub blocks: Vec<HtmlBlock>,
    pub suppress_bibliography: bool,
    pub reference_section_title: String,
}

/// Parallel, cached document renderer.
pub struct Renderer {
    converter: Arc<dyn Converter>,
    cache: SharedCache<BlockKey, HtmlBlock>,
    permits: Arc<Semaphore>,
}

impl Renderer {
    pub fn new(converter: Arc<dyn Converter>, capacity: NonZeroUsize, workers: usize) -> Self {
        Self {
            converter,
            cache: SharedCache::lru(capacity),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Parse and render `content` located in `base_dir`.
    ///
    /// Returns `Ok(None)` when `token` is cancelled before completion.
    #[cfg(test)]
    pub async fn render(
        self: &Arc<Self>,
        content: &str,
        base_dir: &Path,
        token: &CancellationToken,
    ) -> Result<Option<RenderedDocument>, ConvertError> {
        match self.parse(content, base_dir, token).await? {
            Some(parsed) => self.render_parsed(&parsed, token).await,
            None => Ok(None),
        }
    }

    /// Structured-conversion pass: one converter call per document.
    pub async fn parse(
        &self,
        content: &str,
        base_dir: &Path,
        token: &CancellationToken,
    ) -> Result<Option<ParsedDocument>, ConvertError> {
        let (format, body) = split_slide_directive(content);
        let document = tokio::select! {
            doc = self.to_document(body.to_string(), base_dir.to_path_buf()) => doc?,
            () = token.cancelled() => return Ok(None),
        };
        Ok(Some(ParsedDocument {
            format,
            document,
            base_dir: base_dir.to_path_buf(),
        }))
    }

    /// Convert every unit of `parsed`, in document order.
    pub async fn render_parsed(
        self: &Arc<Self>,
        parsed: &ParsedDocument,
        token: &CancellationToken,
    ) -> Result<Option<RenderedDocument>, ConvertError> {
        let ParsedDocument {
            format,
            document: doc,
            base_dir,
        } = parsed;
        let format = *format;
        let base: Arc<Path> = Arc::from(base_dir.as_path());

        let mut keys = Vec::new();
        let has_title = if let Some(fragment) = doc.title_fragment() {
            keys.push(BlockKey {
                fragment: fragment.into(),
                base_dir: Arc::clone(&base),
                format,
                kind: UnitKind::Title,
            });
            true
        } else {
            false
        };
        for unit in partition(&doc.blocks, format) {
            keys.push(BlockKey {
                fragment: doc.fragment(&unit).into(),
                base_dir: Arc::clone(&base),
                format,
                kind: UnitKind::Block,
            });
        }

        let blocks = tokio::select! {
            blocks = self.render_units(keys) => blocks?,
            () = token.cancelled() => return Ok(None),
        };

        // An empty title conversion means the page had no title element
        let blocks = blocks
            .into_iter()
            .enumerate()
            .filter(|(i, b)| !(has_title && *i == 0 && b.html().is_empty()))
            .map(|(_, b)| b)
            .collect();

        Ok(Some(RenderedDocument {
            format,
            blocks,
            suppress_bibliography: doc.meta_bool("suppress-bibliography"),
            reference_section_title: doc.meta_text("reference-section-title").unwrap_or_default(),
        }))
    }

    async fn to_document(&self, content: String, base_dir: PathBuf) -> Result<Document, ConvertError> {
        let permit = self.acquire().await?;
        let converter = Arc::clone(&self.converter);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            converter.to_document(&content, &base_dir)
        })
        .await
        .map_err(join_error)?
    }

    /// Convert all units concurrently; output follows input order.
    async fn render_units(
        self: &Arc<Self>,
        keys: Vec<BlockKey>,
    ) -> Result<Vec<HtmlBlock>, ConvertError> {
        let total = keys.len();
        let mut set = JoinSet::new();
        for (index, key) in keys.into_iter().enumerate() {
            let renderer = Arc::clone(self);
            set.spawn(async move { (index, renderer.render_unit(key).await) });
        }

        let mut slots: Vec<Option<HtmlBlock>> = vec![None; total];
        while let Some(joined) = set.join_next().await {
            let (index, result) = joined.map_err(join_error)?;
            slots[index] = Some(result?);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    async fn render_unit(&self, key: BlockKey) -> Result<HtmlBlock, ConvertError> {
        let pending = key.clone();
        self.cache
            .get_or_try_insert_with(key, || self.convert_unit(pending))
            .await
    }

    async fn convert_unit(&self, key: BlockKey) -> Result<HtmlBlock, ConvertError> {
        let permit = self.acquire().await?;
        let converter = Arc::clone(&self.converter);
        let html = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let standalone = key.kind == UnitKind::Title;
            let raw = converter.to_html(&key.fragment, &key.base_dir, key.format, standalone)?;
            Ok::<_, ConvertError>(postprocess(&raw, &key))
        })
        .await
        .map_err(join_error)??;
        Ok(HtmlBlock::new(html))
    }

    /// Worker slot, held by the blocking call until the converter returns.
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, ConvertError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ConvertError::Process("render pool closed".into()))
    }
}

fn postprocess(raw: &str, key: &BlockKey) -> String {
    match key.kind {
        UnitKind::Title => rewrite::extract_title(raw, key.format)
            .map(|title| rewrite::rewrite_links(title, &key.base_dir))
            .unwrap_or_default(),
        UnitKind::Block if key.format.is_slides() => {
            rewrite::rewrite_links(rewrite::unwrap_section(raw), &key.base_dir)
        }
        UnitKind::Block => rewrite::rewrite_links(raw, &key.base_dir),
    }
}

fn join_error(err: tokio::task::JoinError) -> ConvertError {
    ConvertError::Process(format!("render task failed: {err}"))
}
