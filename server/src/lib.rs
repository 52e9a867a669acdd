use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sift_core::store::{DocumentStore, PostingStore};
use sift_core::{Config, IndexBuilder, InvertedIndex, QueryEngine, RawDocument, SearchRequest, SearchResponse};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    #[serde(alias = "q")]
    pub query: String,
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub indexed: usize,
    pub total_words: usize,
    pub rejected: Vec<Rejected>,
}

#[derive(Serialize)]
pub struct Rejected {
    pub url: String,
    pub reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub terms: usize,
    pub batches: u64,
    pub written: u64,
    pub failed_batches: u64,
    pub dropped: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<InvertedIndex>,
    pub builder: Arc<IndexBuilder>,
    pub engine: Arc<QueryEngine>,
    pub documents: Arc<dyn DocumentStore>,
    pub admin_token: Option<String>,
}

/// Wire the index, builder and query engine over one store.
pub fn build_state<S>(store: Arc<S>, config: &Config, admin_token: Option<String>) -> Result<AppState>
where
    S: PostingStore + DocumentStore + 'static,
{
    let index = Arc::new(InvertedIndex::new(store.clone(), &config.index)?);
    let builder = IndexBuilder::new(Arc::clone(&index), store.clone(), &config.index)?;
    let engine = QueryEngine::new(Arc::clone(&index), store.clone(), &config.search)?;
    Ok(AppState {
        index,
        builder: Arc::new(builder),
        engine: Arc::new(engine),
        documents: store,
        admin_token,
    })
}

/// CORS from a comma-separated origin list; any origin when unset or unparsable.
fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn build_app(state: AppState, cors_allow_origin: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/commit", post(index_commit))
        .with_state(state)
        .layer(cors_layer(cors_allow_origin))
        .layer(TraceLayer::new_for_http())
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let terms = highlight_words(&params.query);
    let request = SearchRequest { query: params.query, page: params.page, page_size: params.page_size };
    let engine = Arc::clone(&state.engine);
    let mut response = tokio::task::spawn_blocking(move || engine.search(&request)).await.map_err(internal)?;
    for hit in &mut response.results {
        hit.description = highlight_terms(&hit.description, &terms);
    }
    Ok(Json(response))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let documents = Arc::clone(&state.documents);
    let (meta, content) = tokio::task::spawn_blocking(move || {
        let meta = documents.get_document(&doc_id)?;
        let content = documents.get_content(&doc_id)?;
        Ok::<_, sift_core::StoreError>((meta, content))
    })
    .await
    .map_err(internal)?
    .map_err(internal)?;

    let Some(meta) = meta else {
        return Err((StatusCode::NOT_FOUND, "document not found".into()));
    };
    Ok(Json(serde_json::json!({
        "docId": meta.doc_id,
        "url": meta.url,
        "title": meta.title,
        "description": meta.description,
        "totalWords": meta.total_words,
        "popularityScore": meta.popularity_score,
        "content": content,
    })))
}

/// Query words as typed, without quotes or punctuation, for display highlighting.
fn highlight_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn highlight_terms(text: &str, terms: &[String]) -> String {
    if terms.is_empty() {
        return text.to_string();
    }
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    match regex::RegexBuilder::new(&format!("({alternation})")).case_insensitive(true).build() {
        Ok(pat) => pat.replace_all(text, "<em>$1</em>").into_owned(),
        Err(_) => text.to_string(),
    }
}

async fn index_batch(State(state): State<AppState>, headers: HeaderMap, Json(docs): Json<Vec<RawDocument>>) -> Result<Json<BatchResponse>, ApiError> {
    authorize(&state, &headers)?;
    let builder = Arc::clone(&state.builder);
    let report = tokio::task::spawn_blocking(move || builder.build(&docs)).await.map_err(internal)?;
    Ok(Json(BatchResponse {
        indexed: report.indexed.len(),
        total_words: report.total_words(),
        rejected: report
            .rejected
            .iter()
            .map(|(url, e)| Rejected { url: url.clone(), reason: e.to_string() })
            .collect(),
    }))
}

async fn index_commit(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CommitResponse>, ApiError> {
    authorize(&state, &headers)?;
    let index = Arc::clone(&state.index);
    let (terms, report) = tokio::task::spawn_blocking(move || {
        index.flush();
        (index.size(), index.flush_report())
    })
    .await
    .map_err(internal)?;
    tracing::info!(terms, written = report.written, "index committed");
    Ok(Json(CommitResponse {
        terms,
        batches: report.batches,
        written: report.written,
        failed_batches: report.failed_batches,
        dropped: report.dropped,
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_query_words_case_insensitively() {
        let terms = highlight_words("\"Quick fox\"");
        assert_eq!(terms, vec!["Quick", "fox"]);
        assert_eq!(highlight_terms("the quick brown Fox", &terms), "the <em>quick</em> brown <em>Fox</em>");
        assert_eq!(highlight_terms("plain", &[]), "plain");
    }
}
