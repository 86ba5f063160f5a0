use std::sync::{Arc, OnceLock};

use crate::error_responses;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Request,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use schemars::{
    schema::{Schema, SchemaObject, SubschemaValidation},
    schema_for, schema_for_value, JsonSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{crypto, db};

pub use response::{ErrorResponse, ErrorResponseDocs};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Absent and not-owned records both end up here, with the same message.
    #[error("not_found")]
    NotFound(String),

    // auth
    #[error("unauthenticated")]
    Unauthenticated,

    // validation
    #[error("validation")]
    Validation(String),
    #[error("validation")]
    JsonValidation(#[from] JsonRejection),
    #[error("validation")]
    PathValidation(#[from] PathRejection),

    /// A stored envelope failed verification: corruption or a wrong key.
    #[error("integrity_failure")]
    IntegrityFailure,

    #[error(transparent)]
    Crypto(crypto::Error),

    #[error(transparent)]
    DB(db::Error),

    #[error(transparent)]
    Config(#[from] envy::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unexpected")]
    Unexpected(String),
}

impl From<db::Error> for Error {
    fn from(error: db::Error) -> Self {
        match error {
            db::Error::NotFound(msg) => Self::NotFound(msg),
            error => Self::DB(error),
        }
    }
}

impl From<crypto::Error> for Error {
    fn from(error: crypto::Error) -> Self {
        match error {
            crypto::Error::TamperedOrCorrupt => Self::IntegrityFailure,
            error => Self::Crypto(error),
        }
    }
}

// Response

error_responses! {
    not_found: 404,
    validation: 400,
    path_validation: 400,
    json_validation: 400,
    unauthenticated: 401,
    integrity_failure: 500,
    unexpected: 500
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        let errors = errors();
        match error {
            Error::NotFound(message) => errors.not_found.with_message(message),
            Error::Unauthenticated => errors.unauthenticated.with_message("Authentication required"),
            Error::Validation(message) => errors.validation.with_message(message),
            Error::JsonValidation(error) => errors.json_validation.with_message(error.body_text()),
            Error::PathValidation(error) => errors.path_validation.with_message(error.body_text()),
            Error::IntegrityFailure => errors
                .integrity_failure
                .with_message("Stored note failed its integrity check"),
            _ => errors.unexpected.with_message("Unexpected"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let error = Arc::new(self);

        let error_res = ErrorResponse::from(error.clone().as_ref());
        let status = error_res.status;

        let mut res = axum::Json(error_res).into_response();
        res.extensions_mut().insert(error);

        *res.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        res
    }
}

pub async fn on_error(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let error = response.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    if let Some(error) = error {
        if response.status().is_server_error() {
            tracing::error!("{:?}", error);
        } else {
            tracing::debug!("{:?}", error);
        }
    }

    response
}

mod response {
    use serde_json::Map;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
    pub struct ErrorResponse {
        pub error: String,
        pub message: Option<String>,
        pub status: u16,
        pub details: Option<Map<String, Value>>,
    }

    impl ErrorResponse {
        pub fn new(error: impl Into<String>, status: u16) -> Self {
            Self {
                error: error.into(),
                status,
                ..Default::default()
            }
        }

        pub fn with_message(&self, message: impl Into<String>) -> Self {
            let mut res = self.clone();
            res.message = Some(message.into());
            res
        }
    }

    pub struct ErrorResponseDocs;

    impl JsonSchema for ErrorResponseDocs {
        fn schema_name() -> String {
            String::from("ErrorResponse")
        }

        fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
            let errors = errors();
            let example_schema = schema_for_value!(errors);

            let error_schemas = example_schema
                .schema
                .metadata
                .as_ref()
                .and_then(|m| m.examples.first())
                .and_then(Value::as_object)
                .map(|examples| {
                    examples
                        .values()
                        .filter_map(|v| {
                            let error = v.get("error")?.as_str()?.to_string();
                            let status = v.get("status")?.as_u64()?;
                            Some(error_schema(error, status))
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let schema = SchemaObject {
                subschemas: Some(Box::new(SubschemaValidation {
                    one_of: Some(error_schemas),
                    ..Default::default()
                })),
                ..Default::default()
            };

            schema.into()
        }
    }

    fn error_schema(error: String, status: u64) -> Schema {
        let mut schema = schema_for!(ErrorResponse).schema;
        let obj = schema.object();

        if let Some(Schema::Object(prop)) = obj.properties.get_mut("status") {
            prop.enum_values = Some(vec![Value::from(status)]);
        }
        if let Some(Schema::Object(prop)) = obj.properties.get_mut("error") {
            prop.enum_values = Some(vec![Value::from(error)]);
        }

        Schema::from(schema)
    }

    /// Typed responses with a custom JSON schema
    /// ```rust,ignore
    /// error_responses! {
    ///     not_found: 404,
    ///     unexpected: 500
    /// }
    ///
    /// impl From<&Error> for ErrorResponse {
    ///     fn from(error: &Error) -> Self {
    ///     let errors = errors(); // <- from macro
    ///     match error {
    ///         Error::NotFound(message) => errors.not_found.with_message(message),
    ///         Error::Unexpected(message) => errors.unexpected.with_message(message),
    ///     }
    /// }
    /// ```
    #[macro_export]
    macro_rules! error_responses {
        (
            $($name:ident: $code:expr),* $(,)?
        ) => {
            #[derive(Debug, Clone, Serialize)]
            struct Responses {
                $(
                    $name: ErrorResponse,
                )*
            }

            static ERRORS: OnceLock<Responses> = OnceLock::new();

            fn errors() -> &'static Responses {
                ERRORS.get_or_init(|| Responses {
                    $(
                        $name: ErrorResponse::new(stringify!($name), $code),
                    )*
                })
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let cases = [
            (Error::NotFound("Note not found".into()), 404),
            (Error::Unauthenticated, 401),
            (Error::Validation("Title is required".into()), 400),
            (Error::IntegrityFailure, 500),
            (Error::Unexpected("boom".into()), 500),
        ];

        for (error, status) in cases {
            assert_eq!(ErrorResponse::from(&error).status, status);
        }
    }

    #[test]
    fn integrity_failure_hides_details() {
        let error = Error::from(crypto::Error::TamperedOrCorrupt);
        assert!(matches!(error, Error::IntegrityFailure));

        let res = ErrorResponse::from(&error);
        assert_eq!(res.error, "integrity_failure");
        assert!(res.details.is_none());
    }

    #[test]
    fn unexpected_errors_are_opaque() {
        let res = ErrorResponse::from(&Error::Unexpected("database is not attached".into()));
        assert_eq!(res.message.as_deref(), Some("Unexpected"));
    }
}
