use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the sheetpress binary.
#[derive(Debug, Parser)]
#[command(name = "sheetpress", version, about = "MusicXML to PDF rendering service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SHEETPRESS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub storage: StorageOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP rendering service.
    Serve(Box<ServeArgs>),
    /// Render a local MusicXML or MXL file to PDF.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Score to render; `.mxl` files are unpacked first.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Semitone shift applied by the notation renderer.
    #[arg(
        long,
        value_name = "SEMITONES",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub transpose: i32,

    /// Where to write the PDF. Defaults to `<file name>.pdf` in the working directory.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RenderOverrides,
}

/// Storage flags, accepted before or after the subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct StorageOverrides {
    /// Override the object store backend (s3|filesystem).
    #[arg(long = "storage-backend", value_name = "BACKEND", global = true)]
    pub backend: Option<String>,

    /// Bucket holding the stored scores.
    #[arg(
        long = "storage-bucket",
        env = "SHEETPRESS_BUCKET",
        value_name = "BUCKET",
        global = true
    )]
    pub bucket: Option<String>,

    /// Region used by the S3 client.
    #[arg(
        long = "storage-region",
        env = "AWS_REGION",
        value_name = "REGION",
        global = true
    )]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL.
    #[arg(long = "storage-endpoint", value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// Root directory for the filesystem backend.
    #[arg(long = "storage-root", value_name = "PATH", global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Chromium executable used for rendering; detected when omitted.
    #[arg(long = "render-chrome-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub chrome_path: Option<PathBuf>,

    /// Override how long a render may take to report completion.
    #[arg(long = "render-ready-timeout-seconds", value_name = "SECONDS")]
    pub ready_timeout_seconds: Option<u64>,

    /// Override the notation renderer bundle URL.
    #[arg(long = "render-script-url", value_name = "URL")]
    pub renderer_script_url: Option<String>,

    /// Launch Chromium without its sandbox (containers without user namespaces).
    #[arg(long = "render-no-sandbox", action = clap::ArgAction::SetTrue)]
    pub no_sandbox: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
