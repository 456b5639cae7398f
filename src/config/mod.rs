//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::DEFAULT_RENDERER_SCRIPT_URL;

pub use cli::{
    CliArgs, Command, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides, StorageOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sheetpress";
const ENV_PREFIX: &str = "SHEETPRESS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_REGION: &str = "us-east-2";
const DEFAULT_STORAGE_ROOT: &str = "storage";
const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 1600;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Filesystem,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "filesystem" | "fs" => Ok(StorageBackend::Filesystem),
            other => Err(format!("unknown backend `{other}`; expected `s3` or `filesystem`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// `None` is allowed at load time; render requests are refused until it is set.
    pub bucket: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: NonZeroU32,
    pub height: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub chrome_executable: Option<PathBuf>,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub viewport: Viewport,
    pub renderer_script_url: String,
    pub sandbox: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_storage_overrides(&cli.storage);
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_storage_overrides(&mut self, overrides: &StorageOverrides) {
        if let Some(backend) = overrides.backend.as_ref() {
            self.storage.backend = Some(backend.clone());
        }
        if let Some(bucket) = overrides.bucket.as_ref() {
            self.storage.bucket = Some(bucket.clone());
        }
        if let Some(region) = overrides.region.as_ref() {
            self.storage.region = Some(region.clone());
        }
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.storage.endpoint = Some(endpoint.clone());
        }
        if let Some(root) = overrides.root.as_ref() {
            self.storage.root = Some(root.clone());
        }
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.chrome_path.as_ref() {
            self.render.chrome_executable = Some(path.clone());
        }
        if let Some(seconds) = overrides.ready_timeout_seconds {
            self.render.ready_timeout_seconds = Some(seconds);
        }
        if let Some(url) = overrides.renderer_script_url.as_ref() {
            self.render.renderer_script_url = Some(url.clone());
        }
        if overrides.no_sandbox {
            self.render.sandbox = Some(false);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            storage,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let storage = build_storage_settings(storage)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            server,
            logging,
            storage,
            render,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = match storage.backend {
        Some(value) => StorageBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("storage.backend", reason))?,
        None => StorageBackend::S3,
    };

    let bucket = non_blank(storage.bucket);
    let endpoint = non_blank(storage.endpoint);

    let region = non_blank(storage.region).unwrap_or_else(|| DEFAULT_REGION.to_string());

    let root = storage
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("storage.root", "path must not be empty"));
    }

    Ok(StorageSettings {
        backend,
        bucket,
        region,
        endpoint,
        root,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let chrome_executable = render
        .chrome_executable
        .filter(|path| !path.as_os_str().is_empty());

    let timeout_secs = render
        .ready_timeout_seconds
        .unwrap_or(DEFAULT_READY_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "render.ready_timeout_seconds",
            "must be greater than zero",
        ));
    }
    let ready_timeout = Duration::from_secs(timeout_secs);

    let poll_ms = render.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if poll_ms == 0 {
        return Err(LoadError::invalid(
            "render.poll_interval_ms",
            "must be greater than zero",
        ));
    }
    let poll_interval = Duration::from_millis(poll_ms);
    if poll_interval >= ready_timeout {
        return Err(LoadError::invalid(
            "render.poll_interval_ms",
            "must be shorter than the ready timeout",
        ));
    }

    let viewport = Viewport {
        width: non_zero_u32(
            render
                .viewport_width
                .unwrap_or(DEFAULT_VIEWPORT_WIDTH)
                .into(),
            "render.viewport_width",
        )?,
        height: non_zero_u32(
            render
                .viewport_height
                .unwrap_or(DEFAULT_VIEWPORT_HEIGHT)
                .into(),
            "render.viewport_height",
        )?,
    };

    let renderer_script_url = non_blank(render.renderer_script_url)
        .unwrap_or_else(|| DEFAULT_RENDERER_SCRIPT_URL.to_string());

    Ok(RenderSettings {
        chrome_executable,
        ready_timeout,
        poll_interval,
        viewport,
        renderer_script_url,
        sandbox: render.sandbox.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    chrome_executable: Option<PathBuf>,
    ready_timeout_seconds: Option<u64>,
    poll_interval_ms: Option<u64>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
    renderer_script_url: Option<String>,
    sandbox: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
