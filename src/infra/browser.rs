//! Headless Chromium rendering environments driven over CDP.
//!
//! Every launch starts a fresh browser process with its own throwaway profile
//! directory. Nothing is pooled between renders.

use std::{path::PathBuf, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::{
    Browser, BrowserConfig, Page, cdp::browser_protocol::page::PrintToPdfParams,
    handler::viewport::Viewport,
};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    application::render::{
        EngineError, PageOptions, READY_REPORT_KEY, ReadyReport, RenderDocument, RenderEngine,
        RenderEnvironment,
    },
    config::RenderSettings,
};

const PROFILE_PREFIX: &str = "sheetpress-chrome-";
const EXTRA_ARGS: [&str; 3] = [
    "--disable-gpu",
    "--hide-scrollbars",
    "--font-render-hinting=none",
];

#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Detected from `PATH` and the usual install locations when `None`.
    pub executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub sandbox: bool,
}

impl From<&RenderSettings> for ChromiumOptions {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            executable: settings.chrome_executable.clone(),
            viewport_width: settings.viewport.width.get(),
            viewport_height: settings.viewport.height.get(),
            sandbox: settings.sandbox,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    options: ChromiumOptions,
}

impl ChromiumEngine {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self, profile: &TempDir) -> Result<BrowserConfig, EngineError> {
        let options = &self.options;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                ..Viewport::default()
            })
            .args(EXTRA_ARGS);

        if let Some(executable) = options.executable.as_ref() {
            builder = builder.chrome_executable(executable);
        }
        if !options.sandbox {
            builder = builder.no_sandbox();
        }

        builder
            .build()
            .map_err(|err| EngineError::new(format!("invalid browser configuration: {err}")))
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Box<dyn RenderEnvironment>, EngineError> {
        let started_at = Instant::now();
        let profile = tempfile::Builder::new()
            .prefix(PROFILE_PREFIX)
            .tempdir()
            .map_err(|err| EngineError::new(format!("failed to create browser profile: {err}")))?;
        let config = self.browser_config(&profile)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| EngineError::new(format!("failed to launch chromium: {err}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                shutdown(&mut browser).await;
                handler.abort();
                return Err(EngineError::new(format!("failed to open page: {err}")));
            }
        };

        info!(
            target = "infra::browser",
            op = "chromium::launch",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            profile = %profile.path().display(),
            "Chromium rendering environment launched"
        );

        Ok(Box::new(ChromiumEnvironment {
            browser,
            handler,
            page,
            _profile: profile,
        }))
    }
}

pub struct ChromiumEnvironment {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    // Removed from disk when the environment is dropped.
    _profile: TempDir,
}

#[async_trait]
impl RenderEnvironment for ChromiumEnvironment {
    async fn load(&mut self, document: &RenderDocument) -> Result<(), EngineError> {
        self.page
            .set_content(document.html())
            .await
            .map_err(|err| EngineError::new(format!("failed to load document: {err}")))?;
        Ok(())
    }

    async fn poll_ready(&mut self) -> Result<Option<ReadyReport>, EngineError> {
        let expression = format!("JSON.stringify(window.{READY_REPORT_KEY} ?? null)");
        let raw: String = self
            .page
            .evaluate(expression)
            .await
            .map_err(|err| EngineError::new(format!("failed to read completion report: {err}")))?
            .into_value()
            .map_err(|err| EngineError::new(format!("completion report is not a string: {err}")))?;

        serde_json::from_str(&raw)
            .map_err(|err| EngineError::new(format!("malformed completion report: {err}")))
    }

    async fn capture_pdf(&mut self, options: &PageOptions) -> Result<Bytes, EngineError> {
        let params = PrintToPdfParams {
            paper_width: Some(options.paper_width),
            paper_height: Some(options.paper_height),
            margin_top: Some(options.margin_top),
            margin_right: Some(options.margin_right),
            margin_bottom: Some(options.margin_bottom),
            margin_left: Some(options.margin_left),
            print_background: Some(options.print_background),
            ..Default::default()
        };

        let pdf = self
            .page
            .pdf(params)
            .await
            .map_err(|err| EngineError::new(format!("failed to print PDF: {err}")))?;
        debug!(
            target = "infra::browser",
            op = "chromium::capture_pdf",
            pdf_bytes = pdf.len(),
            "Captured PDF snapshot"
        );
        Ok(Bytes::from(pdf))
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        let ChromiumEnvironment {
            mut browser,
            handler,
            page,
            _profile,
        } = *self;
        drop(page);

        let closed = browser.close().await;
        if closed.is_err() {
            shutdown(&mut browser).await;
        } else if let Err(err) = browser.wait().await {
            warn!(
                target = "infra::browser",
                op = "chromium::close",
                result = "wait_error",
                error = %err,
                "Chromium process did not exit cleanly"
            );
        }
        handler.abort();

        closed
            .map(|_| ())
            .map_err(|err| EngineError::new(format!("failed to close chromium: {err}")))
    }
}

/// Kill the browser process when the CDP close handshake is unavailable.
async fn shutdown(browser: &mut Browser) {
    if let Some(Err(err)) = browser.kill().await {
        warn!(
            target = "infra::browser",
            op = "chromium::kill",
            result = "error",
            error = %err,
            "Failed to kill chromium process"
        );
    }
}
