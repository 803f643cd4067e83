use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

use super::*;
use crate::config::{PreviewConfig, test_config};
use crate::convert::testing::ScriptedConverter;
use crate::hub::{Frame, next_frame};

const WAIT: Duration = Duration::from_secs(3);

struct Fixture {
    _dir: TempDir,
    home: std::path::PathBuf,
    conv: Arc<ScriptedConverter>,
    pipeline: Pipeline,
    client: ClientHandle,
}

fn fixture_with(configure: impl FnOnce(&mut PreviewConfig)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let home = dir.path().canonicalize().unwrap();
    let mut config = test_config(&home);
    configure(&mut config);

    let conv = Arc::new(ScriptedConverter::new());
    let converter: Arc<dyn Converter> = conv.clone();
    let pipeline = Pipeline::start(&config, converter).unwrap();
    let client = pipeline.register_client();
    Fixture {
        _dir: dir,
        home,
        conv,
        pipeline,
        client,
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

/// Next frame carrying `field`, skipping everything else.
async fn next_with(rx: &crossbeam::channel::Receiver<Frame>, field: &str, within: Duration) -> Option<Value> {
    let deadline = Instant::now() + within;
    loop {
        let left = deadline.checked_duration_since(Instant::now())?;
        let frame = next_frame(rx, left).await?;
        if frame.get(field).is_some() {
            return Some(frame);
        }
    }
}

async fn next_document(f: &Fixture) -> Option<Value> {
    next_with(&f.client.rx, "filepath", WAIT).await
}

fn pipe(content: &str) -> UpdateRequest {
    UpdateRequest::pipe(content.as_bytes().to_vec())
}

fn block_htmls(doc: &Value) -> Vec<String> {
    doc["htmlblocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b[1].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_update_renders_document() {
    let f = fixture();
    f.pipeline.submit_update(pipe("# Hello\nworld"));

    let doc = next_document(&f).await.unwrap();
    assert_eq!(doc["filepath"], "LIVE");
    assert_eq!(block_htmls(&doc), ["<h1>Hello</h1>\n", "<p>world</p>\n"]);
    assert_eq!(doc["suppress-bibliography"], false);
    assert_eq!(doc["reference-section-title"], "");
    assert_eq!(doc["bibid"], Value::Null);
    f.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_directive_routes_document() {
    let f = fixture();
    f.pipeline
        .submit_update(pipe("<!-- filepath:notes/a.md -->\n<img src=\"fig.png\" />"));

    let doc = next_document(&f).await.unwrap();
    assert_eq!(doc["filepath"], "notes/a.md");
    let expected = format!("<img src=\"file://{}/notes/fig.png\" />\n", f.home.display());
    assert_eq!(block_htmls(&doc), [expected]);
}

#[tokio::test]
async fn test_superseded_job_never_delivered() {
    let f = fixture();

    f.pipeline.submit_update(pipe("wait:300\nfirst"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    f.pipeline.submit_update(pipe("second"));
    f.pipeline.submit_update(pipe("third"));

    let doc = next_document(&f).await.unwrap();
    assert_eq!(block_htmls(&doc), ["<p>third</p>\n"]);

    // the first job's converter call still returns; its result is dropped
    assert!(next_with(&f.client.rx, "filepath", Duration::from_millis(500)).await.is_none());
    assert_eq!(f.conv.parses(), 2);
}

#[tokio::test]
async fn test_sequential_updates_all_delivered_in_order() {
    let f = fixture();
    for text in ["one", "two", "three"] {
        f.pipeline.submit_update(pipe(text));
        let doc = next_document(&f).await.unwrap();
        assert_eq!(block_htmls(&doc), [format!("<p>{text}</p>\n")]);
    }
}

#[tokio::test]
async fn test_missing_file_reports_error_and_recovers() {
    let f = fixture();
    f.pipeline.submit_update(pipe("# Before\ntext"));
    assert!(next_document(&f).await.is_some());
    let stats = f.pipeline.cache_stats();

    f.pipeline.submit_update(UpdateRequest::file_path("nope.md"));
    let err = next_with(&f.client.rx, "error", WAIT).await.unwrap();
    assert!(err["error"].as_str().unwrap().contains("nope.md"));
    assert_eq!(f.conv.parses(), 1);
    assert_eq!(f.pipeline.cache_stats(), stats);

    f.pipeline.submit_update(pipe("back"));
    let doc = next_document(&f).await.unwrap();
    assert_eq!(block_htmls(&doc), ["<p>back</p>\n"]);
}

#[tokio::test]
async fn test_missing_file_leaves_running_job_alone() {
    let f = fixture();

    f.pipeline.submit_update(pipe("wait:300\nlive edit"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    f.pipeline.submit_update(UpdateRequest::file_path("nope.md"));

    let (mut error, mut doc) = (None, None);
    while doc.is_none() {
        let frame = next_frame(&f.client.rx, WAIT).await.unwrap();
        if frame.get("error").is_some() {
            error = Some(frame);
        } else if frame.get("filepath").is_some() {
            doc = Some(frame);
        }
    }
    assert!(error.unwrap()["error"].as_str().unwrap().contains("nope.md"));
    assert_eq!(block_htmls(&doc.unwrap()), ["<p>live edit</p>\n"]);
    assert_eq!(f.conv.parses(), 1);
}

#[tokio::test]
async fn test_conversion_failure_reports_error() {
    let f = fixture();
    f.pipeline.submit_update(pipe("FAIL"));
    let err = next_with(&f.client.rx, "error", WAIT).await.unwrap();
    assert!(err["error"].as_str().unwrap().starts_with("conversion failed"));
}

#[tokio::test]
async fn test_invalid_utf8_reports_error() {
    let f = fixture();
    f.pipeline.submit_update(UpdateRequest::pipe(vec![b'#', 0xff]));
    let err = next_with(&f.client.rx, "error", WAIT).await.unwrap();
    assert!(err["error"].as_str().unwrap().contains("UTF-8"));
}

#[tokio::test]
async fn test_viewer_file_request() {
    let f = fixture();
    fs::write(f.home.join("doc.md"), "% Title\nfrom disk").unwrap();

    f.pipeline.handle_client_request("filepath:doc.md");
    let doc = next_document(&f).await.unwrap();
    assert_eq!(doc["filepath"], "doc.md");
    let blocks = block_htmls(&doc);
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].starts_with("<header id=\"title-block-header\">"));
}

#[tokio::test]
async fn test_bibliography_follows_document() {
    let f = fixture();
    fs::write(f.home.join("refs.bib"), "@book{knuth,}").unwrap();

    f.pipeline
        .submit_update(pipe("bibliography: refs.bib\ntext\n[@knuth]"));

    // document and bibliography travel independently; either may come first
    let (mut doc, mut bib) = (None, None);
    while doc.is_none() || bib.is_none() {
        let frame = next_frame(&f.client.rx, WAIT).await.unwrap();
        if frame.get("filepath").is_some() {
            doc = Some(frame);
        } else if frame.get("html").is_some() {
            bib = Some(frame);
        }
    }
    let (doc, bib) = (doc.unwrap(), bib.unwrap());
    let bibid = doc["bibid"].as_str().unwrap().to_string();
    assert_eq!(bib["bibid"], bibid.as_str());
    assert_eq!(bib["html"], "<div id=\"refs\">1 cited</div>");
    assert_eq!(f.conv.bibs(), 1);

    // prose edits keep the citation digest; no new citeproc call
    f.pipeline
        .submit_update(pipe("bibliography: refs.bib\nmore text\n[@knuth]"));
    let doc = next_document(&f).await.unwrap();
    assert_eq!(doc["bibid"], bibid.as_str());
    assert!(next_with(&f.client.rx, "html", Duration::from_millis(200)).await.is_none());
    assert_eq!(f.conv.bibs(), 1);

    // viewer asks again
    f.pipeline.handle_client_request("citeproc");
    let again = next_with(&f.client.rx, "html", WAIT).await.unwrap();
    assert_eq!(again, bib);
}

#[tokio::test]
async fn test_progress_markers_while_running() {
    let f = fixture_with(|c| {
        c.progress.grace_ms = 20;
        c.progress.tick_ms = 20;
    });

    f.pipeline.submit_update(pipe("wait:200\nslow"));
    let status = next_with(&f.client.rx, "status", WAIT).await.unwrap();
    assert_eq!(status["status"], " 🞄 ");

    assert!(next_document(&f).await.is_some());
    while f.client.rx.try_recv().is_ok() {}
    assert!(next_with(&f.client.rx, "status", Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn test_settle_delay_between_renders() {
    let f = fixture_with(|c| c.render.settle_ms = 200);

    f.pipeline.submit_update(pipe("one"));
    assert!(next_document(&f).await.is_some());

    let started = Instant::now();
    f.pipeline.submit_update(pipe("two"));
    let doc = next_document(&f).await.unwrap();
    assert_eq!(block_htmls(&doc), ["<p>two</p>\n"]);
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn test_unregistered_client_gets_nothing() {
    let f = fixture();
    f.pipeline.unregister_client(f.client.id);
    f.pipeline.unregister_client(f.client.id);

    f.pipeline.submit_update(pipe("x"));
    assert!(next_frame(&f.client.rx, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_every_client_receives_document() {
    let f = fixture();
    let other = f.pipeline.handle().register_client();

    f.pipeline.submit_update(pipe("shared"));
    let a = next_document(&f).await.unwrap();
    let b = next_with(&other.rx, "filepath", WAIT).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_shutdown_completes() {
    let f = fixture();
    f.pipeline.submit_update(pipe("wait:100\nx"));
    tokio::time::timeout(WAIT, f.pipeline.shutdown()).await.unwrap();
}

#[tokio::test]
async fn test_zero_capacity_rejected() {
    let mut config = test_config(Path::new("/tmp"));
    config.render.cache_capacity = 0;
    let converter: Arc<dyn Converter> = Arc::new(ScriptedConverter::new());
    assert!(matches!(
        Pipeline::start(&config, converter),
        Err(PipelineError::Startup(_))
    ));
}
