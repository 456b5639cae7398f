//! sheetpress: render stored MusicXML and MXL scores to paginated PDF.
//!
//! The crate is layered the same way end to end:
//!
//! - [`domain`] holds the value types (source documents, payloads, transpose).
//! - [`application`] holds the pipeline: extraction, render document
//!   construction, and the orchestration of one headless rendering environment.
//! - [`infra`] holds the adapters: object stores, the Chromium engine, HTTP,
//!   and telemetry.
//! - [`config`] resolves layered settings (file, environment, CLI).

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
