use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use rse_core::Config;
use rse_parser::TermFilter;
use rse_search::QueryEngine;
use rse_storage::Storage;

#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResultBody {
    url: String,
    title: Option<String>,
    description: Option<String>,
    score: f64,
}

pub async fn run(config: Config, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.listen_address.clone());
    let storage = Storage::connect(&config.database_url, 10).await?;
    storage.run_migrations().await?;

    let engine = Arc::new(QueryEngine::new(
        storage.pool().clone(),
        TermFilter::from_config(&config),
    ));
    let app = router(AppState { engine });

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(listen = %listen, "search API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "No query provided").into_response();
    };

    match state.engine.search(query).await {
        Ok(hits) => {
            let body: Vec<ResultBody> = hits
                .into_iter()
                .map(|hit| ResultBody {
                    url: hit.url,
                    title: hit.title,
                    description: hit.description,
                    score: hit.score,
                })
                .collect();
            Json(body).into_response()
        }
        Err(e) => {
            error!(query, error = %e, "search failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "search backend unavailable").into_response()
        }
    }
}
