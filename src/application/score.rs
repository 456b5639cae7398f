//! Score-to-PDF pipeline shared by the HTTP handler and the local CLI.

use std::{sync::Arc, time::Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    application::{
        extract::{ExtractionError, extract},
        render::{DocumentBuilder, DocumentError, RenderError, RenderOrchestrator, RenderedPdf},
        storage::{ObjectStore, StoreError},
    },
    domain::score::{RenderRequest, SourceDocument, Transpose},
};

#[derive(Debug, Error)]
pub enum ScoreRenderError {
    #[error("storage bucket is not configured")]
    MissingBucket,
    #[error("missing required query parameter `key`")]
    MissingKey,
    #[error("fetch: {0}")]
    Fetch(#[from] StoreError),
    #[error("extract: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("build: {0}")]
    Document(#[from] DocumentError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
}

impl ScoreRenderError {
    pub fn stage(&self) -> &'static str {
        match self {
            ScoreRenderError::MissingBucket => "config",
            ScoreRenderError::MissingKey => "input",
            ScoreRenderError::Fetch(_) => "fetch",
            ScoreRenderError::Extraction(_) => "extract",
            ScoreRenderError::Document(_) => "build",
            ScoreRenderError::Render(_) => "render",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedScore {
    pub title: String,
    pub pdf: RenderedPdf,
}

/// Turns an already fetched document into a PDF.
pub struct ScoreRenderer {
    builder: DocumentBuilder,
    orchestrator: RenderOrchestrator,
}

impl ScoreRenderer {
    pub fn new(builder: DocumentBuilder, orchestrator: RenderOrchestrator) -> Self {
        Self {
            builder,
            orchestrator,
        }
    }

    pub async fn render(
        &self,
        document: SourceDocument,
        transpose: Transpose,
    ) -> Result<RenderedScore, ScoreRenderError> {
        let payload = extract(&document)?;
        debug!(
            target = "application::score",
            key = %document.key,
            format = document.format.as_str(),
            markup_bytes = payload.markup.len(),
            "Notation payload extracted"
        );

        let request = RenderRequest::new(payload, transpose);
        let render_document = self.builder.build(&request)?;
        let pdf = self.orchestrator.render(&render_document).await?;

        Ok(RenderedScore {
            title: request.payload.title,
            pdf,
        })
    }
}

/// Fetches a stored score by key and renders it.
pub struct ScoreRenderService {
    store: Arc<dyn ObjectStore>,
    bucket: Option<String>,
    renderer: ScoreRenderer,
}

impl ScoreRenderService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: Option<String>,
        renderer: ScoreRenderer,
    ) -> Self {
        Self {
            store,
            bucket,
            renderer,
        }
    }

    /// Bucket configuration is checked first, then the key. Neither check
    /// touches the store.
    pub async fn render_key(
        &self,
        key: Option<&str>,
        transpose: Transpose,
    ) -> Result<RenderedScore, ScoreRenderError> {
        let bucket = self
            .bucket
            .as_deref()
            .filter(|bucket| !bucket.is_empty())
            .ok_or(ScoreRenderError::MissingBucket)?;
        let key = key
            .filter(|key| !key.is_empty())
            .ok_or(ScoreRenderError::MissingKey)?;

        let started_at = Instant::now();
        let bytes = self.store.get(bucket, key).await?;
        info!(
            target = "application::score",
            op = "score::fetch",
            result = "ok",
            bucket,
            key,
            bytes = bytes.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Fetched score source"
        );

        self.renderer
            .render(SourceDocument::new(key, bytes), transpose)
            .await
    }
}
