//! HTML post-processing applied to every converted unit.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::convert::OutputFormat;
use crate::utils::path::is_external_link;

/// Client-side hook that opens local links through the previewer.
const LOCAL_LINK_ONCLICK: &str = r#"onclick="return localLinkClickEvent(this);""#;

static LINK_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(href|src)=(["'])([^"']*)["']"#).expect("valid link pattern")
});

/// Point relative `href`/`src` targets at the document's directory.
///
/// Rooted paths, scheme-carrying URLs and `#fragment` links are left
/// alone. Rewritten `href`s get a click hook.
pub fn rewrite_links(html: &str, base_dir: &Path) -> String {
    let base = base_dir.to_string_lossy();
    let base = base.trim_end_matches('/');

    LINK_ATTR
        .replace_all(html, |caps: &Captures| {
            let attr = &caps[1];
            let target = &caps[3];
            if !is_relative_target(target) {
                return caps[0].to_string();
            }
            if attr == "href" {
                format!(r#"{attr}="file://{base}/{target}" {LOCAL_LINK_ONCLICK}"#)
            } else {
                format!(r#"{attr}="file://{base}/{target}""#)
            }
        })
        .into_owned()
}

fn is_relative_target(target: &str) -> bool {
    !target.is_empty()
        && !target.starts_with('/')
        && !target.starts_with('#')
        && !is_external_link(target)
}

/// Strip the outer `<section>` wrapper reveal.js puts around each unit.
pub fn unwrap_section(html: &str) -> &str {
    html.strip_prefix("<section>\n")
        .map(|inner| {
            let inner = inner.trim_end_matches('\n');
            inner.strip_suffix("</section>").unwrap_or(inner)
        })
        .unwrap_or(html)
}

/// Extract the title element from a standalone page.
///
/// Returns `None` when the page has no title element.
pub fn extract_title(page: &str, format: OutputFormat) -> Option<&str> {
    let (open, close) = if format.is_slides() {
        (r#"<section id="title-slide""#, "</section>")
    } else {
        (r#"<header id="title-block-header""#, "</header>")
    };
    let start = page.find(open)?;
    let end = start + page[start..].find(close)? + close.len();
    Some(&page[start..end])
}
