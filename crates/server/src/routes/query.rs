//! `/ciq` image queries.
//!
//! Both verbs answer with a JSON array of matches, best first. Any failure
//! (missing or unreachable url, undecodable image, shard error) is logged and
//! answered with `[]`.

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use index::{QueryResult, Thresholds};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

/// Query string accepted by `/ciq`.
#[derive(Debug, Default, Deserialize)]
pub struct CiqParams {
    /// Image to fetch (GET only)
    pub url: Option<String>,
    /// Coefficient threshold
    pub lc: Option<String>,
    /// Channel-average threshold
    pub le: Option<String>,
}

/// `GET /ciq?url=..&lc=..&le=..`
pub async fn ciq_get(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CiqParams>,
) -> Json<Vec<QueryResult>> {
    let start = Instant::now();
    let thresholds = state.config.thresholds(params.lc.as_deref(), params.le.as_deref());
    let url = params.url.unwrap_or_default();

    let outcome = async {
        if url.trim().is_empty() {
            return Err(ServerError::BadRequest("missing url parameter".into()));
        }
        let bytes = state.fetch(&url).await?;
        run_query(&state, bytes, thresholds).await
    }
    .await;
    respond(outcome, thresholds, start, &url)
}

/// `POST /ciq?lc=..&le=..` with the raw image as body.
pub async fn ciq_post(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CiqParams>,
    body: Bytes,
) -> Json<Vec<QueryResult>> {
    let start = Instant::now();
    let thresholds = state.config.thresholds(params.lc.as_deref(), params.le.as_deref());

    let outcome = if body.is_empty() {
        Err(ServerError::BadRequest("empty request body".into()))
    } else {
        run_query(&state, body.to_vec(), thresholds).await
    };
    respond(outcome, thresholds, start, "<body>")
}

/// Extract the query signature and match it off the async runtime.
async fn run_query(
    state: &Arc<ServerState>,
    bytes: Vec<u8>,
    thresholds: Thresholds,
) -> ServerResult<Vec<QueryResult>> {
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || -> ServerResult<Vec<QueryResult>> {
        let signature = ingest::signature_from_image(state.config.signature_kind, None, &bytes)?;
        let results = state.matcher.match_signature_with(
            &signature,
            thresholds,
            state.config.result_limit,
        )?;
        Ok(results)
    })
    .await?
}

fn respond(
    outcome: ServerResult<Vec<QueryResult>>,
    thresholds: Thresholds,
    start: Instant,
    source: &str,
) -> Json<Vec<QueryResult>> {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(results) => {
            tracing::info!(
                source,
                hits = results.len(),
                lc = thresholds.coefficient,
                le = thresholds.average,
                elapsed_ms,
                "query answered"
            );
            Json(results)
        }
        Err(err) => {
            tracing::warn!(source, error = %err, elapsed_ms, "query failed");
            Json(Vec::new())
        }
    }
}
