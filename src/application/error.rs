use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{application::score::ScoreRenderError, infra::error::InfraError};

pub const MISSING_BUCKET_MESSAGE: &str = "Missing storage bucket configuration.";
pub const MISSING_KEY_MESSAGE: &str = "Missing required query parameter: key";
pub const RENDER_FAILED_PREFIX: &str = "PDF render failed: ";

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Plain-text failure response with the full cause chain kept out of the body.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn public_message(&self) -> &str {
        &self.public_message
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ScoreRenderError> for HttpError {
    fn from(error: ScoreRenderError) -> Self {
        const SOURCE: &str = "infra::http::score_error_to_http_error";
        match &error {
            // Deployment misconfiguration rather than a bad request, so 500 and not 4xx.
            ScoreRenderError::MissingBucket => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                MISSING_BUCKET_MESSAGE,
                &error,
            ),
            ScoreRenderError::MissingKey => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                MISSING_KEY_MESSAGE,
                &error,
            ),
            ScoreRenderError::Fetch(_)
            | ScoreRenderError::Extraction(_)
            | ScoreRenderError::Document(_)
            | ScoreRenderError::Render(_) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{RENDER_FAILED_PREFIX}{error}"),
                &error,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Render(#[from] ScoreRenderError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::{
        extract::ExtractionError,
        render::{RenderError, RenderStage},
        storage::StoreError,
    };

    #[test]
    fn input_failures_are_client_errors() {
        let error = HttpError::from(ScoreRenderError::MissingKey);
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.public_message(), MISSING_KEY_MESSAGE);
    }

    #[test]
    fn missing_bucket_is_a_server_error() {
        let error = HttpError::from(ScoreRenderError::MissingBucket);
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), MISSING_BUCKET_MESSAGE);
    }

    #[test]
    fn pipeline_failures_name_their_stage() {
        let cases = [
            (
                ScoreRenderError::from(StoreError::not_found("scores", "a.xml")),
                "PDF render failed: fetch: ",
            ),
            (
                ScoreRenderError::from(ExtractionError::NoNotationPayload { entries: 1 }),
                "PDF render failed: extract: ",
            ),
            (
                ScoreRenderError::from(RenderError::Timeout {
                    stage: RenderStage::AwaitingReady,
                    waited: Duration::from_secs(30),
                }),
                "PDF render failed: render: ",
            ),
        ];

        for (source, prefix) in cases {
            let error = HttpError::from(source);
            assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(
                error.public_message().starts_with(prefix),
                "unexpected message: {}",
                error.public_message()
            );
        }
    }

    #[test]
    fn report_carries_the_cause_chain() {
        let error = ExtractionError::Archive(zip::result::ZipError::InvalidArchive(
            "missing end of central directory".into(),
        ));
        let report = ErrorReport::from_error(
            "test",
            StatusCode::INTERNAL_SERVER_ERROR,
            &ScoreRenderError::from(error),
        );
        assert!(report.messages.len() >= 2, "{:?}", report.messages);
        assert!(report.messages[0].starts_with("extract: "));
    }
}
