use axum::{
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::domain::score::Transpose;

use super::{
    HttpState,
    response::{failure_response, pdf_response},
};

/// Raw query values; `transpose` is coerced rather than rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RenderQuery {
    key: Option<String>,
    transpose: Option<String>,
}

pub(super) async fn render_score(
    State(state): State<HttpState>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let transpose = Transpose::parse(query.transpose.as_deref());
    match state.scores.render_key(query.key.as_deref(), transpose).await {
        Ok(score) => pdf_response(score),
        Err(err) => failure_response(err),
    }
}
