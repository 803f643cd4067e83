//! Bibliography subsystem.
//!
//! A single background task owns bibliography computation. Requests carry
//! the [`BibKey`] of the latest rendered document; requests arriving while
//! a computation runs are coalesced so only the newest one runs next.
//!
//! ```text
//! render job ──Compute(key)──▶ BibActor ──cache miss──▶ citeproc
//!  viewer    ──Resend───────▶    │
//!                                └──{html, bibid}──▶ Hub
//! ```

mod digest;

pub use digest::{BibKey, CitationDigest};

use std::num::NonZeroUsize;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::SharedCache;
use crate::convert::{ConvertError, Converter};
use crate::hub::{Hub, OutboundMessage};

/// Messages to the bibliography task.
#[derive(Debug)]
pub enum BibMsg {
    /// Bring the bibliography up to date with a document.
    /// `None` means the document has no citation metadata.
    Compute(Option<BibKey>),
    /// Re-broadcast the last computed bibliography.
    Resend,
    Shutdown,
}

/// Last computed bibliography.
#[derive(Debug)]
pub struct BibState {
    pub key: Option<BibKey>,
    pub bibid: Option<String>,
    pub html: String,
}

impl BibState {
    fn message(&self) -> OutboundMessage {
        OutboundMessage::Bibliography {
            html: self.html.clone(),
            bibid: self.bibid.clone(),
        }
    }
}

/// Handle to the bibliography task.
#[derive(Clone)]
pub struct Bibliography {
    tx: mpsc::UnboundedSender<BibMsg>,
    last: Arc<ArcSwapOption<BibState>>,
}

impl Bibliography {
    /// Spawn the bibliography task on the current runtime.
    pub fn spawn(
        converter: Arc<dyn Converter>,
        hub: Arc<Hub>,
        capacity: NonZeroUsize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let last = Arc::new(ArcSwapOption::empty());
        let actor = BibActor {
            rx,
            converter,
            hub,
            cache: SharedCache::lru(capacity),
            last: Arc::clone(&last),
        };
        let task = tokio::spawn(actor.run());
        (Self { tx, last }, task)
    }

    pub fn request(&self, key: Option<BibKey>) {
        self.send(BibMsg::Compute(key));
    }

    pub fn resend(&self) {
        self.send(BibMsg::Resend);
    }

    pub fn shutdown(&self) {
        self.send(BibMsg::Shutdown);
    }

    /// Last computed state, if any.
    #[cfg(test)]
    pub fn current(&self) -> Option<Arc<BibState>> {
        self.last.load_full()
    }

    fn send(&self, msg: BibMsg) {
        if self.tx.send(msg).is_err() {
            crate::debug!("biblio"; "bibliography task already stopped");
        }
    }
}

/// Work gathered from one drain of the inbox.
#[derive(Default)]
struct Batch {
    compute: Option<Option<BibKey>>,
    resend: bool,
    shutdown: bool,
}

impl Batch {
    fn absorb(&mut self, msg: BibMsg) {
        match msg {
            // newest pending request wins
            BibMsg::Compute(key) => self.compute = Some(key),
            BibMsg::Resend => self.resend = true,
            BibMsg::Shutdown => self.shutdown = true,
        }
    }
}

struct BibActor {
    rx: mpsc::UnboundedReceiver<BibMsg>,
    converter: Arc<dyn Converter>,
    hub: Arc<Hub>,
    cache: SharedCache<BibKey, String>,
    last: Arc<ArcSwapOption<BibState>>,
}

impl BibActor {
    async fn run(mut self) {
        while let Some(first) = self.rx.recv().await {
            let mut batch = Batch::default();
            batch.absorb(first);
            while let Ok(msg) = self.rx.try_recv() {
                batch.absorb(msg);
            }

            if batch.shutdown {
                crate::debug!("biblio"; "shutting down");
                break;
            }

            let broadcast = match batch.compute {
                Some(key) => self.compute(key).await,
                None => false,
            };
            if batch.resend && !broadcast {
                self.resend();
            }
        }
    }

    /// Compute and broadcast; returns whether a bibliography went out.
    async fn compute(&self, key: Option<BibKey>) -> bool {
        if self.last.load_full().is_some_and(|last| last.key == key) {
            crate::debug!("biblio"; "bibliography unchanged");
            return false;
        }

        let html = match &key {
            None => String::new(),
            Some(key) => match self.lookup(key).await {
                Ok(html) => html,
                Err(e) => {
                    crate::log!("biblio"; "citation processing failed: {}", e);
                    let msg = OutboundMessage::error(format!("citation processing failed: {e}"));
                    self.hub.broadcast(&msg);
                    return false;
                }
            },
        };

        let state = BibState {
            bibid: key.as_ref().map(BibKey::bibid),
            key,
            html,
        };
        let report = self.hub.broadcast(&state.message());
        crate::debug!("biblio"; "bibliography {:?} sent to {} clients", state.bibid, report.delivered);
        self.last.store(Some(Arc::new(state)));
        true
    }

    async fn lookup(&self, key: &BibKey) -> Result<String, ConvertError> {
        self.cache
            .get_or_try_insert_with(key.clone(), || {
                let converter = Arc::clone(&self.converter);
                let digest = key.digest.json.clone();
                let base_dir = key.digest.base_dir.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        converter.to_bibliography(&digest, &base_dir)
                    })
                    .await
                    .map_err(|e| ConvertError::Process(format!("citeproc task failed: {e}")))?
                }
            })
            .await
    }

    fn resend(&self) {
        match self.last.load_full() {
            Some(state) => {
                self.hub.broadcast(&state.message());
            }
            None => crate::debug!("biblio"; "no bibliography to resend"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use serde_json::Value;

    use crate::convert::testing::ScriptedConverter;
    use crate::hub::{ClientHandle, next_frame};

    const WAIT: Duration = Duration::from_secs(2);

    fn key(cites: usize) -> BibKey {
        let blocks: Vec<Value> = (0..cites)
            .map(|i| serde_json::json!({"t": "Para", "c": [{"t": "Cite", "c": [[{"citationId": format!("k{i}")}], []]}]}))
            .collect();
        let json = serde_json::json!({
            "blocks": blocks,
            "meta": {"nocite": {"t": "MetaString", "c": "@*"}},
            "pandoc-api-version": [1, 23, 1],
        })
        .to_string();
        CitationDigest {
            json,
            base_dir: PathBuf::from("/n"),
            bibliography: Vec::new(),
            csl: None,
        }
        .observe()
    }

    fn setup() -> (Arc<ScriptedConverter>, Bibliography, ClientHandle) {
        let conv = Arc::new(ScriptedConverter::new());
        let hub = Arc::new(Hub::default());
        let client = hub.connect();
        let converter: Arc<dyn Converter> = conv.clone();
        let (bib, _task) = Bibliography::spawn(converter, hub, NonZeroUsize::new(8).unwrap());
        (conv, bib, client)
    }

    #[tokio::test]
    async fn test_new_key_broadcasts_bibliography() {
        let (conv, bib, client) = setup();
        let k = key(2);
        let bibid = k.bibid();

        bib.request(Some(k));
        let msg = next_frame(&client.rx, WAIT).await.unwrap();
        assert_eq!(msg["html"], "<div id=\"refs\">2 cited</div>");
        assert_eq!(msg["bibid"], bibid.as_str());
        assert_eq!(conv.bibs(), 1);
        assert_eq!(bib.current().unwrap().bibid.as_deref(), Some(bibid.as_str()));
    }

    #[tokio::test]
    async fn test_same_key_is_skipped() {
        let (conv, bib, client) = setup();

        bib.request(Some(key(1)));
        assert!(next_frame(&client.rx, WAIT).await.is_some());

        bib.request(Some(key(1)));
        assert!(next_frame(&client.rx, Duration::from_millis(100)).await.is_none());
        assert_eq!(conv.bibs(), 1);
    }

    #[tokio::test]
    async fn test_no_citations_sends_empty_without_converter() {
        let (conv, bib, client) = setup();

        bib.request(None);
        let msg = next_frame(&client.rx, WAIT).await.unwrap();
        assert_eq!(msg["html"], "");
        assert_eq!(msg["bibid"], Value::Null);
        assert_eq!(conv.bibs(), 0);
    }

    #[tokio::test]
    async fn test_returning_key_served_from_cache() {
        let (conv, bib, client) = setup();

        for cites in [1, 2, 1] {
            bib.request(Some(key(cites)));
            assert!(next_frame(&client.rx, WAIT).await.is_some());
        }
        assert_eq!(conv.bibs(), 2);
    }

    #[tokio::test]
    async fn test_pending_requests_coalesce_to_newest() {
        let (conv, bib, client) = setup();
        let newest = key(3);
        let newest_id = newest.bibid();

        // queued before the task first runs
        bib.request(Some(key(1)));
        bib.request(Some(key(2)));
        bib.request(Some(newest));

        let msg = next_frame(&client.rx, WAIT).await.unwrap();
        assert_eq!(msg["bibid"], newest_id.as_str());
        assert!(next_frame(&client.rx, Duration::from_millis(100)).await.is_none());
        assert_eq!(conv.bibs(), 1);
    }

    #[tokio::test]
    async fn test_resend_repeats_last() {
        let (conv, bib, client) = setup();

        bib.resend();
        assert!(next_frame(&client.rx, Duration::from_millis(100)).await.is_none());

        bib.request(Some(key(1)));
        let first = next_frame(&client.rx, WAIT).await.unwrap();
        bib.resend();
        let again = next_frame(&client.rx, WAIT).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(conv.bibs(), 1);
    }

    #[tokio::test]
    async fn test_failure_reports_error_and_keeps_previous_state() {
        let (_conv, bib, client) = setup();

        bib.request(Some(key(1)));
        let good = next_frame(&client.rx, WAIT).await.unwrap();

        let broken = CitationDigest {
            json: "not a document".into(),
            base_dir: PathBuf::from("/n"),
            bibliography: Vec::new(),
            csl: None,
        }
        .observe();
        bib.request(Some(broken));
        let error = next_frame(&client.rx, WAIT).await.unwrap();
        assert!(error["error"].as_str().unwrap().contains("citation processing failed"));
        assert!(error.get("bibid").is_none());
        assert!(next_frame(&client.rx, Duration::from_millis(100)).await.is_none());
        assert_eq!(bib.current().unwrap().bibid.as_deref(), good["bibid"].as_str());
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let conv = Arc::new(ScriptedConverter::new());
        let converter: Arc<dyn Converter> = conv;
        let (bib, task) = Bibliography::spawn(
            converter,
            Arc::new(Hub::default()),
            NonZeroUsize::new(8).unwrap(),
        );
        bib.shutdown();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }
}
