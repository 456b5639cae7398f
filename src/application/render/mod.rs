//! Score rendering pipeline.
//!
//! A render request becomes a self-contained HTML document, the document is
//! executed inside an isolated rendering environment, and the environment's
//! print snapshot comes back as PDF bytes. The engine behind the environment is
//! a port so the browser adapter lives in `infra` and tests can substitute it.

mod document;
mod orchestrator;
mod types;

pub use document::{
    DEFAULT_RENDERER_SCRIPT_URL, DocumentBuilder, DocumentError, READY_REPORT_KEY, escape_html,
};
pub use orchestrator::{
    DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT, OrchestratorConfig, RenderOrchestrator,
};
pub use types::{
    EngineError, PageOptions, ReadyReport, RenderDocument, RenderEngine, RenderEnvironment,
    RenderError, RenderStage, RenderedPdf, TransposeOutcome, mm_to_inches,
};
