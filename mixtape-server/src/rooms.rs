use axum::{
    extract::{Path, Query, State},
    routing::get,
    routing::post,
    Json,
};
use mixtape_core::{NewRoom, RoomError, UpdateRoomSettings};

use crate::{
    auth::BearerToken,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{DeleteRoomSchema, JoinQuery, NewRoomSchema, UpdateRoomSchema, ValidatedJson},
    serialized::{RoomCreated, RoomJoined, RoomProperties, RoomReport, RoomState, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    responses(
        (status = 200, body = RoomCreated),
        (status = 409, description = "The host is already hosting a room")
    )
)]
pub(crate) async fn create_room(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<RoomCreated>> {
    let created = context
        .engine
        .rooms
        .create_room(NewRoom {
            host_username: body.host_username,
            room_name: body.room_name,
            lifetime_minutes: body.lifetime,
            max_users: body.max_users,
            is_public: body.is_public,
        })
        .await?;

    Ok(Json(created.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = UpdateRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomProperties)
    )
)]
pub(crate) async fn update_room(
    State(context): State<ServerContext>,
    BearerToken(token): BearerToken,
    ValidatedJson(body): ValidatedJson<UpdateRoomSchema>,
) -> ServerResult<Json<RoomProperties>> {
    // The issuer gates the route; the engine still matches the stored token
    context.engine.issuer().verify(&token)?;

    let properties = context
        .engine
        .rooms
        .update_settings(UpdateRoomSettings {
            host_username: body.host_username,
            access_token: token,
            room_name: body.room_name,
            max_users: body.max_users,
            is_public: body.is_public,
        })
        .await?;

    Ok(Json(properties.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = DeleteRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomReport),
        (status = 409, description = "No songs have been played yet")
    )
)]
pub(crate) async fn delete_room(
    State(context): State<ServerContext>,
    BearerToken(token): BearerToken,
    ValidatedJson(body): ValidatedJson<DeleteRoomSchema>,
) -> ServerResult<Json<RoomReport>> {
    context.engine.issuer().verify(&token)?;

    let report = context
        .engine
        .rooms
        .delete_room(&token, &body.host_username, &body.room_id)
        .await?;

    Ok(Json(report.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/join",
    tag = "rooms",
    params(
        ("id" = String, Path, description = "The room to join"),
        ("roomPassword" = String, Query, description = "The room's join secret"),
        ("username" = String, Query, description = "The joining user")
    ),
    responses(
        (status = 200, body = RoomJoined),
        (status = 403, description = "The room or password is wrong, or the room is full")
    )
)]
pub(crate) async fn join_room(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    Query(query): Query<JoinQuery>,
) -> ServerResult<Json<RoomJoined>> {
    context
        .engine
        .rooms
        .add_user_to_room(&room_id, &query.room_password, &query.username)
        .await
        .map_err(|e| match e {
            // A wrong room id and a wrong password are indistinguishable
            // from the outside
            RoomError::RoomNotFound | RoomError::InvalidPassword | RoomError::RoomFull => {
                ServerError::Forbidden
            }
            e => e.into(),
        })?;

    Ok(Json(RoomJoined::new(&query.username, &room_id)))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/state",
    tag = "rooms",
    params(
        ("id" = String, Path, description = "The room to inspect")
    ),
    responses(
        (status = 200, body = RoomState)
    )
)]
pub(crate) async fn room_state(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<RoomState>> {
    let state = context.engine.rooms.room_state(&room_id).await?;

    Ok(Json(state.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            post(create_room).put(update_room).delete(delete_room),
        )
        .route("/:id/join", get(join_room))
        .route("/:id/state", get(room_state))
}
