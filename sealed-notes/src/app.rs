use aide::scalar::Scalar;
use axum::{middleware, response::IntoResponse, routing::get, Extension, Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;

use rand::Rng;
use serde_json::json;

use crate::{
    config::config,
    crypto::FieldCodec,
    db::DB,
    errors::{self, on_error},
    openapi::{self, aide::axum::ApiRouter, OpenApi},
    state::AppState,
};

pub struct AppParams<Router>
where
    Router: FnOnce(AppState) -> ApiRouter,
{
    pub db: DB,
    pub codec: FieldCodec,
    pub router: Router,
}

pub async fn create<R>(AppParams { db, codec, router }: AppParams<R>) -> errors::Result<(Router, OpenApi)>
where
    R: FnOnce(AppState) -> ApiRouter,
{
    let mut api = OpenApi::default();

    let state = AppState { conn: db.clone() };

    let docs_router = axum::Router::new()
        .route(
            "/__docs__",
            get(Scalar::new("/__docs__/spec.json")
                .with_title("Sealed Notes API")
                .axum_handler()),
        )
        .route("/__docs__/spec.json", get(serve_docs));

    let app = ApiRouter::new()
        .route("/__version__", get(version))
        .route("/__heartbeat__", get(heartbeat))
        .route("/__lbheartbeat__", get(lbheartbeat))
        .merge(docs_router)
        .merge(router(state))
        .finish_api_with(&mut api, openapi::api_docs)
        .layer(
            ServiceBuilder::new()
                .layer(Extension(db))
                .layer(Extension(codec))
                .layer(Extension(Arc::new(api.clone())))
                .layer(middleware::from_fn(on_error)),
        );

    Ok((app, api))
}

async fn version() -> impl IntoResponse {
    let config = config();
    Json(json!({
        "source" : config.source,
        "version": config.app_version.as_deref().unwrap_or(&config.version),
        "commit" : config.git_commit,
        "build"  : config.pipeline_id
    }))
}

async fn heartbeat() -> impl IntoResponse {
    let mut rng = rand::thread_rng();
    let random: u32 = rng.gen_range(0..=10000);

    Json(json!({
        "status" : "ok",
        "random": random,
    }))
}

async fn lbheartbeat() -> impl IntoResponse {
    ""
}

async fn serve_docs(Extension(api): Extension<Arc<OpenApi>>) -> impl IntoResponse {
    Json(api.as_ref()).into_response()
}

#[cfg(test)]
mod tests {
    use crate::{
        db::init_test_db,
        errors::Result,
        notes,
        tests::{test_codec, test_server},
    };
    use serde_json::Value;

    #[tokio::test]
    async fn service_endpoints() -> Result<()> {
        let db = init_test_db().await?;
        let server = test_server(db, test_codec(), notes::router).await?;

        let heartbeat = server.get("/__heartbeat__").await.json::<Value>();
        assert_eq!(heartbeat["status"], "ok");

        let version = server.get("/__version__").await.json::<Value>();
        assert!(version["commit"].is_string());

        server.get("/__lbheartbeat__").await.assert_text("");
        Ok(())
    }

    #[tokio::test]
    async fn docs_describe_bearer_auth() -> Result<()> {
        let db = init_test_db().await?;
        let server = test_server(db, test_codec(), notes::router).await?;

        let doc = server.get("/__docs__/spec.json").await.json::<Value>();
        assert_eq!(doc["components"]["securitySchemes"]["bearer"]["scheme"], "bearer");
        assert!(doc["paths"]["/api/notes"]["post"]["requestBody"]["content"]["application/json"].is_object());
        assert!(doc["paths"]["/api/notes/{note_id}"]["put"]["requestBody"].is_object());
        assert!(doc["paths"]["/api/notes/{note_id}"]["delete"].is_object());
        Ok(())
    }
}
