use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use bytes::Bytes;
use sheetpress::{
    application::{
        error::AppError,
        render::{DocumentBuilder, OrchestratorConfig, PageOptions, RenderOrchestrator},
        score::{ScoreRenderService, ScoreRenderer},
    },
    config,
    domain::score::{SourceDocument, Transpose},
    infra::{
        browser::{ChromiumEngine, ChromiumOptions},
        error::InfraError,
        http::{self, HttpState, response::pdf_filename},
        storage, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

fn build_renderer(settings: &config::RenderSettings) -> ScoreRenderer {
    let engine = Arc::new(ChromiumEngine::new(ChromiumOptions::from(settings)));
    let orchestrator = RenderOrchestrator::new(
        engine,
        OrchestratorConfig {
            ready_timeout: settings.ready_timeout,
            poll_interval: settings.poll_interval,
            page: PageOptions::letter(),
        },
    );
    ScoreRenderer::new(
        DocumentBuilder::new(settings.renderer_script_url.clone()),
        orchestrator,
    )
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = storage::connect(&settings.storage).await?;
    let scores = Arc::new(ScoreRenderService::new(
        store,
        settings.storage.bucket.clone(),
        build_renderer(&settings.render),
    ));

    if settings.storage.bucket.is_none() {
        warn!(
            target = "sheetpress::serve",
            "No storage bucket configured; render requests will fail until one is set"
        );
    }

    let router = http::build_router(HttpState { scores });
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "sheetpress::serve",
        addr = %settings.server.addr,
        backend = ?settings.storage.backend,
        "Listening for render requests"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(target = "sheetpress::serve", "Shutdown signal received");
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let source = tokio::fs::read(&args.file)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let key = local_key(&args.file)?;

    let renderer = build_renderer(&settings.render);
    let rendered = renderer
        .render(
            SourceDocument::new(key, Bytes::from(source)),
            Transpose::new(args.transpose),
        )
        .await?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(pdf_filename(&rendered.title)));
    tokio::fs::write(&output, &rendered.pdf.bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "sheetpress::render",
        input = %args.file.display(),
        output = %output.display(),
        pdf_bytes = rendered.pdf.bytes.len(),
        transpose = rendered.pdf.transpose.as_str(),
        "PDF written"
    );
    Ok(())
}

/// The file name plays the role of the storage key: it drives both the
/// format and the title.
fn local_key(path: &Path) -> Result<String, AppError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::validation(format!(
                "`{}` does not name a UTF-8 file",
                path.display()
            ))
        })
}
