use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::models::{ReviewReport, ReviewRequest, SearchRequest, SearchResponse};
use crate::pipeline::ReviewInput;
use crate::state::AppState;

const MAX_SEARCH_LIMIT: usize = 50;
const MAX_SOURCE_BYTES: usize = 1_000_000;

type ApiError = (StatusCode, String);

fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {e}"))
}

/// POST /api/review - Run the full pipeline over one submitted source file.
pub async fn review(
    State(state): State<AppState>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewReport>, ApiError> {
    let file_name = req.file_name.trim().to_string();
    if file_name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "file_name is required".to_string()));
    }
    if req.source.len() > MAX_SOURCE_BYTES {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("source exceeds {MAX_SOURCE_BYTES} bytes"),
        ));
    }

    let _permit = state
        .review_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Review service at capacity".to_string(),
            )
        })?;

    let input = ReviewInput::from_source(file_name, req.source)
        .with_query(req.query)
        .with_findings(req.findings);

    let pipeline = state.pipeline.clone();
    let report = tokio::task::spawn_blocking(move || pipeline.review(&input))
        .await
        .map_err(|e| internal("Review task failed", e))?
        .map_err(|e| internal("Review failed", e))?;

    Ok(Json(report))
}

/// POST /api/search - Ranked knowledge entries for a free-text query.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    let limit = req.limit.min(MAX_SEARCH_LIMIT);

    let pipeline = state.pipeline.clone();
    let q = query.clone();
    let results = tokio::task::spawn_blocking(move || pipeline.searcher().search(&q, limit))
        .await
        .map_err(|e| internal("Search task failed", e))?
        .map_err(|e| internal("Search failed", e))?;

    Ok(Json(SearchResponse { query, results }))
}

/// GET /api/topics - Every indexed knowledge entry title.
pub async fn topics(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let pipeline = state.pipeline.clone();
    let topics = tokio::task::spawn_blocking(move || pipeline.searcher().all_topics())
        .await
        .map_err(|e| internal("Topics task failed", e))?
        .map_err(|e| internal("Listing topics failed", e))?;
    Ok(Json(topics))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub documents: u64,
    pub strategy: &'static str,
    pub indexed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub pruned: usize,
}

/// GET /api/status - Index size and the active generation strategy.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let pipeline = &state.pipeline;
    let report = pipeline.index_report();
    Json(StatusResponse {
        documents: pipeline.index().num_docs(),
        strategy: pipeline.strategy_name(),
        indexed: report.indexed,
        unchanged: report.unchanged,
        skipped: report.skipped.len(),
        pruned: report.pruned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feedback::TemplateStrategy;
    use crate::models::Finding;
    use crate::pipeline::Pipeline;
    use std::sync::Arc;

    fn state_with_entry() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let kb = dir.path().join("kb");
        std::fs::create_dir(&kb).unwrap();
        std::fs::write(
            kb.join("vector.json"),
            r#"{"title": "Avoid Vector", "type": "AntiPattern",
                "description": "Vector synchronizes every call.",
                "tags": ["vector", "arraylist", "legacy"]}"#,
        )
        .unwrap();

        let config = Config {
            kb_dir: kb,
            index_dir: dir.path().join("index"),
            ..Config::default()
        };
        let pipeline =
            Pipeline::bootstrap_with(config, Box::new(TemplateStrategy::default())).unwrap();
        (dir, AppState::new(Arc::new(pipeline)))
    }

    #[tokio::test]
    async fn test_review_endpoint_returns_report() {
        let (_dir, state) = state_with_entry();
        let req = ReviewRequest {
            file_name: "Legacy.java".into(),
            source: "Vector<String> v;".into(),
            query: None,
            findings: vec![Finding::new("ReplaceVectorWithList", "Legacy.java:1")],
        };
        let Json(report) = review(State(state), Json(req)).await.unwrap();
        assert_eq!(report.file_label, "Legacy.java");
        assert!(!report.items.is_empty());
        assert!(report.summary.findings >= 1);
    }

    #[tokio::test]
    async fn test_review_requires_file_name() {
        let (_dir, state) = state_with_entry();
        let req = ReviewRequest {
            file_name: "  ".into(),
            source: String::new(),
            query: None,
            findings: Vec::new(),
        };
        let err = review(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let (_dir, state) = state_with_entry();
        let req = SearchRequest {
            query: "Vector".into(),
            limit: 5,
        };
        let Json(resp) = search(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].entry.title, "Avoid Vector");

        let empty = SearchRequest {
            query: " ".into(),
            limit: 5,
        };
        assert!(search(State(state), Json(empty)).await.is_err());
    }

    #[tokio::test]
    async fn test_topics_and_status() {
        let (_dir, state) = state_with_entry();
        let Json(titles) = topics(State(state.clone())).await.unwrap();
        assert_eq!(titles, vec!["Avoid Vector"]);

        let Json(current) = status(State(state)).await;
        assert_eq!(current.documents, 1);
        assert_eq!(current.strategy, "template");
        assert_eq!(current.indexed, 1);
    }
}
