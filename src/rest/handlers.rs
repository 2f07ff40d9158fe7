use std::sync::Arc;

use axum::{
    Json,
    extract::{OriginalUri, Path, Query, State},
};
use tracing::info;

use super::{
    errors::{catalog_error, player_error},
    models::{NowPlaying, PlayRequest, PlayResponse, SearchHit, SearchQuery, Skipped, StartRequest},
};
use crate::{
    catalog::{self, Catalog, CatalogError, CatalogItem},
    common::{errors::ApiError, types::RoomId},
    configs::MAX_SEARCH_LIMIT,
    player::{EnqueueReceipt, RoomSnapshot},
    protocol::tracks::TrackRef,
    server::AppState,
    voice::CallerLocation,
};

/// Artists shown before a listing collapses to "Various Artists".
const DISPLAY_ARTIST_LIMIT: usize = 1;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// GET /v1/search?term=...&type=track|album&limit=...
pub async fn search(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Vec<SearchHit>> {
    let limit = params
        .limit
        .unwrap_or(state.config.jellyfin.search_limit)
        .clamp(1, MAX_SEARCH_LIMIT);

    let items = state
        .catalog
        .search(&params.term, limit, params.filter)
        .await
        .map_err(|e| catalog_error(&e, uri.path()))?;

    Ok(Json(
        items
            .into_iter()
            .map(|item| SearchHit {
                display: item.display(DISPLAY_ARTIST_LIMIT),
                item,
            })
            .collect(),
    ))
}

/// First catalog item matching a play request.
pub async fn resolve(
    catalog: &dyn Catalog,
    request: &PlayRequest,
) -> Result<CatalogItem, CatalogError> {
    let found = match (&request.id, &request.query) {
        (Some(id), _) => catalog.lookup_by_ids(std::slice::from_ref(id)).await?,
        (None, Some(query)) => catalog.search(query, 1, request.filter).await?,
        (None, None) => Vec::new(),
    };

    let wanted = request.id.as_deref().or(request.query.as_deref()).unwrap_or_default();
    found
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::NotFound(wanted.to_string()))
}

/// POST /v1/rooms/{room_id}/play
pub async fn play(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    OriginalUri(uri): OriginalUri,
    Json(request): Json<PlayRequest>,
) -> ApiResult<PlayResponse> {
    let path = uri.path();
    if request.id.is_none() && request.query.is_none() {
        return Err(ApiError::bad_request("either `id` or `query` is required", path));
    }

    let room = RoomId::from(room_id);
    let item = resolve(state.catalog.as_ref(), &request)
        .await
        .map_err(|e| catalog_error(&e, path))?;
    let tracks = catalog::expand(state.catalog.as_ref(), item.clone())
        .await
        .map_err(|e| catalog_error(&e, path))?;

    let label = item.display(DISPLAY_ARTIST_LIMIT);
    info!("[{}] Enqueue {} ({:?})", room, label, request.when);

    let EnqueueReceipt { queued, started } = state
        .registry
        .enqueue(
            &room,
            tracks,
            request.when,
            request.channel.map(CallerLocation::from),
        )
        .await
        .map_err(|e| player_error(&e, path))?;

    Ok(Json(PlayResponse {
        item,
        display: label,
        queued,
        started,
    }))
}

/// GET /v1/rooms/{room_id}/queue
pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Json<Vec<TrackRef>> {
    Json(state.registry.queue_of(&RoomId::from(room_id)))
}

/// GET /v1/rooms/{room_id}/nowplaying
pub async fn now_playing(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Json<NowPlaying> {
    let snapshot = state.registry.snapshot(&RoomId::from(room_id));
    Json(NowPlaying {
        track: snapshot.now_playing,
        paused: snapshot.paused,
    })
}

/// GET /v1/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSnapshot>> {
    Json(state.registry.rooms())
}

/// POST /v1/rooms/{room_id}/skip
pub async fn skip(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<Skipped> {
    let skipped = state
        .registry
        .skip(&RoomId::from(room_id))
        .await
        .map_err(|e| player_error(&e, uri.path()))?;
    Ok(Json(Skipped { skipped }))
}

/// POST /v1/rooms/{room_id}/pause
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<RoomSnapshot> {
    let room = RoomId::from(room_id);
    state
        .registry
        .pause(&room)
        .await
        .map_err(|e| player_error(&e, uri.path()))?;
    Ok(Json(state.registry.snapshot(&room)))
}

/// POST /v1/rooms/{room_id}/resume
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<RoomSnapshot> {
    let room = RoomId::from(room_id);
    state
        .registry
        .resume(&room)
        .await
        .map_err(|e| player_error(&e, uri.path()))?;
    Ok(Json(state.registry.snapshot(&room)))
}

/// POST /v1/rooms/{room_id}/start
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    OriginalUri(uri): OriginalUri,
    body: Option<Json<StartRequest>>,
) -> ApiResult<RoomSnapshot> {
    let room = RoomId::from(room_id);
    let caller = body
        .and_then(|Json(req)| req.channel)
        .map(CallerLocation::from);

    state
        .registry
        .start(&room, caller)
        .await
        .map_err(|e| player_error(&e, uri.path()))?;
    Ok(Json(state.registry.snapshot(&room)))
}

/// DELETE /v1/rooms/{room_id}/connection
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<RoomSnapshot> {
    let room = RoomId::from(room_id);
    state
        .registry
        .disconnect(&room)
        .await
        .map_err(|e| player_error(&e, uri.path()))?;
    Ok(Json(state.registry.snapshot(&room)))
}
