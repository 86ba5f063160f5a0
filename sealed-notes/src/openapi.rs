use aide::operation::OperationIo;
use aide::transform::{TransformOpenApi, TransformOperation};
use aide::OperationOutput;
use axum::response::IntoResponse;
use axum_macros::{FromRequest, FromRequestParts};
use indexmap::IndexMap;
use serde::Serialize;

pub use aide;
pub use aide::openapi::OpenApi;

use crate::errors::ErrorResponseDocs;

/// Name of the bearer token security scheme in the generated document.
pub const BEARER_AUTH: &str = "bearer";

/// JSON body; rejections become `crate::Error`.
#[derive(FromRequest, OperationIo)]
#[from_request(via(axum::Json), rejection(crate::Error))]
#[aide(input_with = "axum::Json<T>", output_with = "axum::Json<T>", json_schema)]
pub struct Json<T>(pub T);

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(FromRequestParts, OperationIo)]
#[from_request(via(axum::extract::Path), rejection(crate::Error))]
#[aide(
    input_with = "axum::extract::Path<T>",
    output_with = "axum::Json<T>",
    json_schema
)]
pub struct Path<T>(pub T);

pub fn api_docs(api: TransformOpenApi) -> TransformOpenApi {
    api.title("Sealed Notes")
        .description("Personal notes, encrypted at rest and visible only to their owner.")
        .security_scheme(
            BEARER_AUTH,
            aide::openapi::SecurityScheme::Http {
                scheme: "bearer".into(),
                bearer_format: None,
                description: Some("Access token issued with `sealed-notes add-user`".into()),
                extensions: Default::default(),
            },
        )
        .default_response::<Json<ErrorResponseDocs>>()
}

pub fn authenticated(op: TransformOperation) -> TransformOperation {
    op.security_requirement(BEARER_AUTH)
}

impl OperationOutput for crate::Error {
    type Inner = ();

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Option<aide::openapi::Response> {
        let mut schema = ctx.schema.subschema_for::<ErrorResponseDocs>().into_object();

        Some(aide::openapi::Response {
            description: schema.metadata().description.clone().unwrap_or_default(),
            content: IndexMap::from_iter([(
                "application/json".into(),
                aide::openapi::MediaType {
                    schema: Some(aide::openapi::SchemaObject {
                        json_schema: schema.into(),
                        example: None,
                        external_docs: None,
                    }),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        })
    }

    fn inferred_responses(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Vec<(Option<u16>, aide::openapi::Response)> {
        Self::operation_response(ctx, operation)
            .map(|res| vec![(None, res)])
            .unwrap_or_default()
    }
}
