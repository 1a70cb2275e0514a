//! Context-internal painting.
//!
//! This is the work that happens on the isolated side of the channel: turn
//! untrusted artifact content into a complete, sanitized document based on
//! its kind, then splice it into the bootstrap shell. Scripts are displayed,
//! never executed; markup is sanitized before it reaches the shell.

use thiserror::Error;

use crate::bootstrap::Bootstrap;
use crate::channel::ArtifactKind;

/// Error producing a painted document.
#[derive(Debug, Error)]
pub enum PaintError {
    #[error("structured data does not parse: {0}")]
    InvalidData(#[from] serde_json::Error),
}

/// Paint artifact content into a complete document.
pub fn paint(code: &str, kind: ArtifactKind, bootstrap: &Bootstrap) -> Result<String, PaintError> {
    let body = match kind {
        ArtifactKind::Markup => sanitize_markup(code),
        ArtifactKind::Markdown => render_markdown(code),
        ArtifactKind::Json => render_data(code)?,
        ArtifactKind::Code => code_block(code, "language-python"),
        ArtifactKind::Component => code_block(code, "language-jsx"),
    };
    Ok(bootstrap.apply(&body))
}

/// Strip executable and event-handler constructs from raw markup.
fn sanitize_markup(code: &str) -> String {
    ammonia::clean(code)
}

fn render_markdown(code: &str) -> String {
    let html = comrak::markdown_to_html(code, &comrak::Options::default());
    // comrak escapes raw HTML by default, but inline constructs it lets
    // through still go through the same sanitizer as markup.
    ammonia::clean(&html)
}

fn render_data(code: &str) -> Result<String, PaintError> {
    let value: serde_json::Value = serde_json::from_str(code)?;
    let pretty = serde_json::to_string_pretty(&value)?;
    Ok(format!(
        "<pre class=\"data\">{}</pre>",
        ammonia::clean_text(&pretty)
    ))
}

fn code_block(code: &str, class: &str) -> String {
    format!(
        "<pre><code class=\"{class}\">{}</code></pre>",
        ammonia::clean_text(code)
    )
}
