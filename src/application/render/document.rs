//! Render document construction.
//!
//! The document embeds the score as base64 and the transpose as an integer
//! literal. Its script loads the pinned OpenSheetMusicDisplay bundle, lays the
//! score out, tries the transpose, and then publishes a [`ReadyReport`] under
//! [`READY_REPORT_KEY`] on `window`.
//!
//! Transposition is best-effort. When the renderer's transpose pathway throws,
//! the script records the message in the report and still publishes it, so the
//! render completes and the caller sees a degraded outcome instead of a failure.
//!
//! [`ReadyReport`]: super::types::ReadyReport

use askama::Template;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

use crate::domain::score::RenderRequest;

use super::types::RenderDocument;

/// Global the embedded script assigns its completion report to.
pub const READY_REPORT_KEY: &str = "__SHEETPRESS_READY__";

pub const DEFAULT_RENDERER_SCRIPT_URL: &str =
    "https://cdn.jsdelivr.net/npm/opensheetmusicdisplay@1.8.8/build/opensheetmusicdisplay.min.js";

#[derive(Debug, Error)]
#[error("failed to build render document: {0}")]
pub struct DocumentError(#[from] askama::Error);

#[derive(Template)]
#[template(path = "render/score.html")]
struct ScoreTemplate<'a> {
    title: &'a str,
    renderer_script_url: &'a str,
    markup_base64: &'a str,
    transpose: i32,
    ready_key: &'a str,
}

/// Builds render documents for a fixed renderer bundle.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    renderer_script_url: String,
}

impl DocumentBuilder {
    pub fn new(renderer_script_url: impl Into<String>) -> Self {
        Self {
            renderer_script_url: renderer_script_url.into(),
        }
    }

    pub fn build(&self, request: &RenderRequest) -> Result<RenderDocument, DocumentError> {
        let title = escape_html(request.title());
        let renderer_script_url = escape_html(&self.renderer_script_url);
        let markup_base64 = STANDARD.encode(&request.payload.markup);
        let template = ScoreTemplate {
            title: &title,
            renderer_script_url: &renderer_script_url,
            markup_base64: &markup_base64,
            transpose: request.transpose.semitones(),
            ready_key: READY_REPORT_KEY,
        };
        let html = template.render()?;
        Ok(RenderDocument::new(html, request.transpose))
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RENDERER_SCRIPT_URL)
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
