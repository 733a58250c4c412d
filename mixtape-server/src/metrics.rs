use axum::{
    extract::{Path, State},
    routing::get,
    Json,
};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{SongActionSchema, ValidatedJson},
    serialized::{QueueEntry, RoomMetrics, RoomPlaylist, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/metrics/{id}",
    tag = "metrics",
    params(
        ("id" = String, Path, description = "The room to aggregate")
    ),
    responses(
        (status = 200, body = RoomMetrics)
    )
)]
pub(crate) async fn room_metrics(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<RoomMetrics>> {
    let metrics = context.engine.metrics.room_metrics(&room_id).await?;

    Ok(Json(metrics.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/metrics/{id}",
    tag = "metrics",
    request_body = SongActionSchema,
    params(
        ("id" = String, Path, description = "The room the song lives in")
    ),
    responses(
        (status = 200, description = "The vote was applied"),
        (status = 400, description = "The action is not a valid song action")
    )
)]
pub(crate) async fn song_operation(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<SongActionSchema>,
) -> ServerResult<()> {
    context
        .engine
        .metrics
        .song_operation(&room_id, &body.song_id, &body.user_id, &body.action)
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/metrics/{id}/history",
    tag = "metrics",
    params(
        ("id" = String, Path, description = "The room whose history to read")
    ),
    responses(
        (status = 200, body = Vec<QueueEntry>)
    )
)]
pub(crate) async fn queue_history(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<Vec<QueueEntry>>> {
    let history = context.engine.metrics.queue_history(&room_id).await?;

    Ok(Json(history.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/metrics/{id}/playlist",
    tag = "metrics",
    params(
        ("id" = String, Path, description = "The room whose playlist to read")
    ),
    responses(
        (status = 200, body = RoomPlaylist)
    )
)]
pub(crate) async fn rooms_playlist(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<RoomPlaylist>> {
    let playlist = context.engine.metrics.rooms_playlist(&room_id).await?;

    Ok(Json(playlist.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(room_metrics).post(song_operation))
        .route("/:id/history", get(queue_history))
        .route("/:id/playlist", get(rooms_playlist))
}
