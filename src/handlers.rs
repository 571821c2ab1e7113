// HTTP handlers for the community directory

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::address::{to_checksum, NormalizedAddress};
use crate::assembler::CommunityView;
use crate::error::DirectoryResult;
use crate::filter::ListQuery;
use crate::models::{CommunityEdit, GroupCount, NewCommunity};
use crate::service::PageResponse;
use crate::AppState;

/// Set by the upstream auth layer once the caller's wallet is verified.
pub const CALLER_HEADER: &str = "x-caller-address";

/// Missing or malformed caller headers are treated as anonymous.
fn caller(headers: &HeaderMap) -> Option<NormalizedAddress> {
    let raw = headers.get(CALLER_HEADER)?.to_str().ok()?;
    match to_checksum(raw) {
        Ok(address) => Some(address),
        Err(e) => {
            warn!("Ignoring caller header: {}", e);
            None
        }
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (db_health, indexer_health) = tokio::join!(
        state.directory.store().ping(),
        state.directory.metrics().ping(),
    );

    let status = if db_health && indexer_health {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(serde_json::json!({
        "status": status,
        "database": if db_health { "up" } else { "down" },
        "indexer": if indexer_health { "up" } else { "down" },
    }))
}

pub async fn list_communities(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> DirectoryResult<Json<PageResponse>> {
    let caller = caller(&headers);
    let page = state.directory.list(&query, caller.as_ref()).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountQuery {
    pub group_by: Option<String>,
}

pub async fn count_communities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CountQuery>,
) -> DirectoryResult<Json<Vec<GroupCount>>> {
    let counts = state
        .directory
        .count_grouped(query.group_by.as_deref())
        .await?;
    Ok(Json(counts))
}

pub async fn get_community(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> DirectoryResult<Json<CommunityView>> {
    let caller = caller(&headers);
    let community = state.directory.find(&key, caller.as_ref()).await?;
    Ok(Json(community))
}

pub async fn create_community(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewCommunity>,
) -> DirectoryResult<(StatusCode, Json<CommunityView>)> {
    let community = state.directory.create(&new).await?;
    Ok((StatusCode::CREATED, Json(community)))
}

pub async fn update_community(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(edit): Json<CommunityEdit>,
) -> DirectoryResult<Json<CommunityView>> {
    let caller = caller(&headers);
    let community = state.directory.edit(id, &edit, caller.as_ref()).await?;
    Ok(Json(community))
}

pub async fn remove_community(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> DirectoryResult<StatusCode> {
    state.directory.remove(id).await?;
    info!("Removed community {} via API", id);
    Ok(StatusCode::NO_CONTENT)
}
