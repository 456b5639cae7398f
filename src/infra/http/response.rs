//! Turns pipeline outcomes into HTTP responses.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::application::{
    error::HttpError,
    score::{RenderedScore, ScoreRenderError},
};

pub const TRANSPOSE_HEADER: HeaderName = HeaderName::from_static("x-sheetpress-transpose");

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Inline PDF response, readable cross-origin.
pub fn pdf_response(score: RenderedScore) -> Response {
    let RenderedScore { title, pdf } = score;
    let length = pdf.bytes.len();

    let mut response = Response::new(Body::from(pdf.bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PDF_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"",
        pdf_filename(&title)
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        TRANSPOSE_HEADER,
        HeaderValue::from_static(pdf.transpose.as_str()),
    );

    response
}

/// Plain-text failure; never carries PDF bytes.
pub fn failure_response(error: ScoreRenderError) -> Response {
    HttpError::from(error).into_response()
}

pub fn pdf_filename(title: &str) -> String {
    format!("{}.pdf", sanitize_filename(title))
}

/// Replace each run of characters outside `[A-Za-z0-9_.-]` with a single `_`.
pub fn sanitize_filename(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    let mut in_run = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
            sanitized.push(ch);
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use bytes::Bytes;

    use super::*;
    use crate::application::render::{RenderedPdf, TransposeOutcome};

    #[test]
    fn sanitized_names_keep_word_chars_dots_and_hyphens() {
        let name = pdf_filename("Fantaisie Op.15 (arr).musicxml");
        assert_eq!(name, "Fantaisie_Op.15_arr_.musicxml.pdf");
        assert!(
            name.chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
        );
    }

    #[test]
    fn source_extension_is_kept() {
        assert_eq!(pdf_filename("song.xml"), "song.xml.pdf");
        assert_eq!(pdf_filename("Sheet Music"), "Sheet_Music.pdf");
    }

    #[test]
    fn non_ascii_and_quotes_collapse_into_one_separator() {
        assert_eq!(sanitize_filename("Für \"Elise\""), "F_r_Elise_");
        assert_eq!(sanitize_filename("a\u{3000}\u{3000}b"), "a_b");
    }

    #[tokio::test]
    async fn pdf_response_sets_headers_and_body() {
        let response = pdf_response(RenderedScore {
            title: "song.xml".to_string(),
            pdf: RenderedPdf {
                bytes: Bytes::from_static(b"%PDF-1.7"),
                transpose: TransposeOutcome::Degraded {
                    reason: "boom".to_string(),
                },
            },
        });

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(headers[header::CONTENT_LENGTH], "8");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "inline; filename=\"song.xml.pdf\""
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[TRANSPOSE_HEADER], "degraded");

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body, Bytes::from_static(b"%PDF-1.7"));
    }

    #[tokio::test]
    async fn failure_response_is_plain_text_without_pdf() {
        let response = failure_response(ScoreRenderError::MissingKey);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_ne!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("application/pdf")
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body, "Missing required query parameter: key");
    }
}
