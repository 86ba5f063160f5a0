use crate::{
    ctx::{self, BaseParams},
    openapi::{
        self,
        aide::{
            axum::{routing::get_with, ApiRouter, IntoApiResponse},
            generate::GenContext,
            openapi::{Operation, Response as ApiResponse},
            transform::TransformOperation,
            NoApi, OperationOutput,
        },
        Json, Path,
    },
    state::AppState,
};
use axum::{
    http::{HeaderName, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
};

use schemars::JsonSchema;

use serde::Deserialize;
use uuid::Uuid;

use super::{CreateNote, DeleteNoteResponse, Note, NoteListing, UpdateNote};

use super::handlers;

#[derive(Debug, Deserialize, JsonSchema)]
struct NoteIdPath {
    note_id: Uuid,
}

pub fn router(state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/api/notes",
            get_with(find_notes, docs::find_notes).post_with(create_note, docs::create_note),
        )
        .api_route(
            "/api/notes/{note_id}",
            get_with(get_note, docs::get_note)
                .put_with(update_note, docs::update_note)
                .delete_with(delete_note, docs::delete_note),
        )
        .route_layer(middleware::from_fn(ctx::authenticated))
        .with_state(state)
}

/// Number of the caller's notes left out of a listing because they failed verification.
pub const UNREADABLE_NOTES_HEADER: HeaderName = HeaderName::from_static("x-unreadable-notes");

impl IntoResponse for NoteListing {
    fn into_response(self) -> Response {
        let mut res = Json(self.notes).into_response();
        if !self.unreadable.is_empty() {
            res.headers_mut()
                .insert(UNREADABLE_NOTES_HEADER, HeaderValue::from(self.unreadable.len()));
        }
        res
    }
}

impl OperationOutput for NoteListing {
    type Inner = Vec<Note>;

    fn operation_response(ctx: &mut GenContext, operation: &mut Operation) -> Option<ApiResponse> {
        Json::<Vec<Note>>::operation_response(ctx, operation)
    }
}

async fn find_notes(NoApi(base): NoApi<BaseParams>) -> impl IntoApiResponse {
    handlers::find_notes(base).await
}

async fn create_note(NoApi(base): NoApi<BaseParams>, Json(args): Json<CreateNote>) -> impl IntoApiResponse {
    handlers::create_note(args, base).await.map(Json)
}

async fn get_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    NoApi(base): NoApi<BaseParams>,
) -> impl IntoApiResponse {
    handlers::get_note(note_id, base).await.map(Json)
}

async fn update_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    NoApi(base): NoApi<BaseParams>,
    Json(args): Json<UpdateNote>,
) -> impl IntoApiResponse {
    handlers::update_note(note_id, args, base).await.map(Json)
}

async fn delete_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    NoApi(base): NoApi<BaseParams>,
) -> impl IntoApiResponse {
    handlers::delete_note(note_id, base).await.map(Json)
}

mod docs {
    use super::*;

    pub fn find_notes(op: TransformOperation) -> TransformOperation {
        openapi::authenticated(op)
            .summary("List own notes")
            .description(
                "Most recently updated first. Notes that fail decryption are left out \
                and counted in the `x-unreadable-notes` response header.",
            )
            .response::<200, Json<Vec<Note>>>()
    }

    pub fn create_note(op: TransformOperation) -> TransformOperation {
        openapi::authenticated(op)
            .summary("Create a note")
            .response::<200, Json<Note>>()
    }

    pub fn get_note(op: TransformOperation) -> TransformOperation {
        openapi::authenticated(op).summary("Read a note").response::<200, Json<Note>>()
    }

    pub fn update_note(op: TransformOperation) -> TransformOperation {
        openapi::authenticated(op)
            .summary("Replace title and body")
            .description("Omitting `body` clears it.")
            .response::<200, Json<Note>>()
    }

    pub fn delete_note(op: TransformOperation) -> TransformOperation {
        openapi::authenticated(op)
            .summary("Delete a note")
            .response::<200, Json<DeleteNoteResponse>>()
    }
}
