use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::score::Transpose;

const MM_PER_INCH: f64 = 25.4;

/// Self-contained HTML document executed inside a rendering environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDocument {
    html: String,
    transpose: Transpose,
}

impl RenderDocument {
    pub fn new(html: String, transpose: Transpose) -> Self {
        Self { html, transpose }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Transpose the embedded script will attempt to apply.
    pub fn transpose(&self) -> Transpose {
        self.transpose
    }
}

/// Physical page layout for the PDF snapshot. Lengths are in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub print_background: bool,
}

impl PageOptions {
    /// US Letter with 12 mm margins on every side and backgrounds printed.
    pub fn letter() -> Self {
        let margin = mm_to_inches(12.0);
        Self {
            paper_width: 8.5,
            paper_height: 11.0,
            margin_top: margin,
            margin_right: margin,
            margin_bottom: margin,
            margin_left: margin,
            print_background: true,
        }
    }
}

impl Default for PageOptions {
    fn default() -> Self {
        Self::letter()
    }
}

pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

/// One-shot completion report the embedded script publishes when it is done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadyReport {
    /// Set when the renderer's transpose pathway threw.
    pub transpose_error: Option<String>,
    /// Set when loading or the initial layout threw.
    pub failed: Option<String>,
}

/// What happened to the requested transposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransposeOutcome {
    /// No shift was requested.
    Skipped,
    /// The shift was applied without a reported failure.
    Applied,
    /// The shift was attempted but the renderer threw; output may be
    /// untransposed or partially transposed.
    Degraded { reason: String },
}

impl TransposeOutcome {
    pub fn from_report(transpose: Transpose, report: &ReadyReport) -> Self {
        match (&report.transpose_error, transpose.is_identity()) {
            (Some(reason), _) => TransposeOutcome::Degraded {
                reason: reason.clone(),
            },
            (None, true) => TransposeOutcome::Skipped,
            (None, false) => TransposeOutcome::Applied,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransposeOutcome::Skipped => "skipped",
            TransposeOutcome::Applied => "applied",
            TransposeOutcome::Degraded { .. } => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, TransposeOutcome::Degraded { .. })
    }
}

/// Successful render.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Bytes,
    pub transpose: TransposeOutcome,
}

/// Orchestration stages, in the order a render walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Launching,
    Loading,
    AwaitingReady,
    Capturing,
}

impl RenderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderStage::Launching => "launch",
            RenderStage::Loading => "load",
            RenderStage::AwaitingReady => "await_ready",
            RenderStage::Capturing => "capture",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a rendering engine adapter.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Classified render failures.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("rendering did not finish within {}s during {stage}", .waited.as_secs_f64())]
    Timeout { stage: RenderStage, waited: Duration },
    #[error("notation renderer failed: {message}")]
    Script { message: String },
    #[error("rendering environment {stage} failed: {message}")]
    Environment { stage: RenderStage, message: String },
}

impl RenderError {
    pub fn environment(stage: RenderStage, error: EngineError) -> Self {
        Self::Environment {
            stage,
            message: error.to_string(),
        }
    }

    pub fn stage(&self) -> Option<RenderStage> {
        match self {
            RenderError::Timeout { stage, .. } | RenderError::Environment { stage, .. } => {
                Some(*stage)
            }
            RenderError::Script { .. } => None,
        }
    }
}

/// Launches isolated rendering environments. One environment per render.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderEnvironment>, EngineError>;
}

/// Exclusive handle to one launched rendering environment.
///
/// `close` consumes the handle, so an environment is torn down at most once.
#[async_trait]
pub trait RenderEnvironment: Send {
    /// Inject the document and wait for its load lifecycle to settle.
    async fn load(&mut self, document: &RenderDocument) -> Result<(), EngineError>;

    /// Read the completion report; `None` until the script publishes it.
    async fn poll_ready(&mut self) -> Result<Option<ReadyReport>, EngineError>;

    async fn capture_pdf(&mut self, options: &PageOptions) -> Result<Bytes, EngineError>;

    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}
