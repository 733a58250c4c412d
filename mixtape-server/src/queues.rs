use axum::{
    extract::{Path, State},
    routing::post,
    Json,
};
use mixtape_core::NewSong;

use crate::{
    auth::BearerToken,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{AddSongSchema, ReorderSchema, ValidatedJson},
    serialized::{QueueEntry, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/queues/{id}/playlist",
    tag = "queues",
    params(
        ("id" = String, Path, description = "The room whose queue to read")
    ),
    responses(
        (status = 200, body = Vec<QueueEntry>)
    )
)]
pub(crate) async fn current_queue(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<Vec<QueueEntry>>> {
    let queue = context.engine.queues.current_queue(&room_id).await?;

    Ok(Json(queue.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/queues/{id}/playlist",
    tag = "queues",
    request_body = AddSongSchema,
    params(
        ("id" = String, Path, description = "The room to queue into")
    ),
    responses(
        (status = 200, body = QueueEntry)
    )
)]
pub(crate) async fn add_song(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<AddSongSchema>,
) -> ServerResult<Json<QueueEntry>> {
    let entry = context
        .engine
        .queues
        .add_song(
            &room_id,
            NewSong {
                title: body.song_name,
                artist: body.artist_name,
                album: body.album_name,
                added_by: body.added_by,
            },
        )
        .await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/queues/{id}/playlist",
    tag = "queues",
    request_body = ReorderSchema,
    security(
        ("BearerAuth" = [])
    ),
    params(
        ("id" = String, Path, description = "The room whose queue to reorder")
    ),
    responses(
        (status = 200, body = Vec<QueueEntry>),
        (status = 400, description = "The new order is not a permutation of the queue")
    )
)]
pub(crate) async fn reorder_queue(
    State(context): State<ServerContext>,
    BearerToken(token): BearerToken,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<ReorderSchema>,
) -> ServerResult<Json<Vec<QueueEntry>>> {
    let claims = context.engine.issuer().verify(&token)?;

    if claims.room_id != room_id {
        return Err(ServerError::Forbidden);
    }

    let queue = context
        .engine
        .queues
        .update_queue(&room_id, &body.new_order)
        .await?;

    Ok(Json(queue.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/queues/{id}/next",
    tag = "queues",
    params(
        ("id" = String, Path, description = "The room to advance")
    ),
    responses(
        (status = 200, body = QueueEntry),
        (status = 409, description = "The queue is empty")
    )
)]
pub(crate) async fn next_song(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<QueueEntry>> {
    let entry = context.engine.queues.next_song(&room_id).await?;

    Ok(Json(entry.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/:id/playlist",
            post(add_song).get(current_queue).put(reorder_queue),
        )
        .route("/:id/next", post(next_song))
}
