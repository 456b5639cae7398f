use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use tokio::time::{Instant as TokioInstant, sleep_until, timeout};
use tracing::{debug, info, warn};

use super::types::{
    EngineError, PageOptions, ReadyReport, RenderDocument, RenderEngine, RenderEnvironment,
    RenderError, RenderStage, RenderedPdf, TransposeOutcome,
};

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Upper bound for loading the document and, separately, for the
    /// completion report to appear.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub page: PageOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page: PageOptions::letter(),
        }
    }
}

/// Drives one rendering environment per call through
/// launch, load, await ready, capture, and teardown.
pub struct RenderOrchestrator {
    engine: Arc<dyn RenderEngine>,
    config: OrchestratorConfig,
}

impl RenderOrchestrator {
    pub fn new(engine: Arc<dyn RenderEngine>, config: OrchestratorConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn render(&self, document: &RenderDocument) -> Result<RenderedPdf, RenderError> {
        let started_at = Instant::now();

        let outcome = match self.engine.launch().await {
            Ok(mut environment) => {
                let outcome = self.drive(environment.as_mut(), document).await;
                teardown(environment, started_at).await;
                outcome
            }
            Err(err) => Err(RenderError::environment(RenderStage::Launching, err)),
        };

        record_outcome(&outcome, document, started_at);
        outcome
    }

    async fn drive(
        &self,
        environment: &mut dyn RenderEnvironment,
        document: &RenderDocument,
    ) -> Result<RenderedPdf, RenderError> {
        self.bounded(RenderStage::Loading, environment.load(document))
            .await?
            .map_err(|err| RenderError::environment(RenderStage::Loading, err))?;

        let report = self.await_ready(environment).await?;

        if let Some(message) = report.failed.clone() {
            return Err(RenderError::Script { message });
        }
        let transpose = TransposeOutcome::from_report(document.transpose(), &report);

        let bytes = environment
            .capture_pdf(&self.config.page)
            .await
            .map_err(|err| RenderError::environment(RenderStage::Capturing, err))?;

        Ok(RenderedPdf { bytes, transpose })
    }

    async fn bounded<T>(
        &self,
        stage: RenderStage,
        future: impl Future<Output = T>,
    ) -> Result<T, RenderError> {
        timeout(self.config.ready_timeout, future)
            .await
            .map_err(|_| RenderError::Timeout {
                stage,
                waited: self.config.ready_timeout,
            })
    }

    /// Poll for the completion report until the ready timeout elapses.
    ///
    /// A failed poll counts as "not ready yet": the page may still be replacing
    /// its execution context. If the deadline passes while the most recent
    /// poll was failing, that failure is reported instead of a plain timeout.
    async fn await_ready(
        &self,
        environment: &mut dyn RenderEnvironment,
    ) -> Result<ReadyReport, RenderError> {
        let deadline = TokioInstant::now() + self.config.ready_timeout;
        let mut last_error: Option<EngineError> = None;

        loop {
            let remaining = deadline.saturating_duration_since(TokioInstant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, environment.poll_ready()).await {
                Ok(Ok(Some(report))) => return Ok(report),
                Ok(Ok(None)) => last_error = None,
                Ok(Err(err)) => {
                    debug!(
                        target = "application::render::orchestrator",
                        op = "orchestrator::poll_ready",
                        result = "retry",
                        error = %err,
                        "Completion report unreadable; polling again"
                    );
                    last_error = Some(err);
                }
                Err(_) => break,
            }

            sleep_until(deadline.min(TokioInstant::now() + self.config.poll_interval)).await;
        }

        Err(match last_error {
            Some(err) => RenderError::environment(RenderStage::AwaitingReady, err),
            None => RenderError::Timeout {
                stage: RenderStage::AwaitingReady,
                waited: self.config.ready_timeout,
            },
        })
    }
}

async fn teardown(environment: Box<dyn RenderEnvironment>, started_at: Instant) {
    if let Err(err) = environment.close().await {
        counter!("sheetpress_environment_close_failures_total").increment(1);
        warn!(
            target = "application::render::orchestrator",
            op = "orchestrator::teardown",
            result = "error",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            error = %err,
            "Failed to close rendering environment"
        );
    }
}

fn record_outcome(
    outcome: &Result<RenderedPdf, RenderError>,
    document: &RenderDocument,
    started_at: Instant,
) {
    let elapsed = started_at.elapsed();
    histogram!("sheetpress_render_ms").record(elapsed.as_secs_f64() * 1000.0);

    match outcome {
        Ok(pdf) => {
            counter!("sheetpress_render_total", "result" => "ok").increment(1);
            info!(
                target = "application::render::orchestrator",
                op = "orchestrator::render",
                result = "ok",
                elapsed_ms = elapsed.as_millis() as u64,
                transpose = document.transpose().semitones(),
                transpose_outcome = pdf.transpose.as_str(),
                pdf_bytes = pdf.bytes.len(),
                "Score rendered to PDF"
            );
            if let TransposeOutcome::Degraded { reason } = &pdf.transpose {
                warn!(
                    target = "application::render::orchestrator",
                    op = "orchestrator::render",
                    result = "transpose_degraded",
                    transpose = document.transpose().semitones(),
                    reason = %reason,
                    "Transposition failed inside the renderer; output may be untransposed"
                );
            }
        }
        Err(err) => {
            let result = match err {
                RenderError::Timeout { .. } => "timeout",
                RenderError::Script { .. } => "script_error",
                RenderError::Environment { .. } => "error",
            };
            counter!("sheetpress_render_total", "result" => result).increment(1);
            warn!(
                target = "application::render::orchestrator",
                op = "orchestrator::render",
                result = result,
                elapsed_ms = elapsed.as_millis() as u64,
                stage = err.stage().map(RenderStage::as_str).unwrap_or("script"),
                error = %err,
                "Score render failed"
            );
        }
    }
}
