use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace,
    trace::TraceLayer,
};
use tracing_subscriber::prelude::*;

/// `json` switches to one JSON object per event. `console` also serves tokio-console.
pub fn setup_tracing(json: bool, console: bool) {
    let tracing = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealed_notes=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(console.then(|| console_subscriber::ConsoleLayer::builder().with_default_env().spawn()));

    let result = if json {
        tracing.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        tracing
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false),
            )
            .try_init()
    };
    result.ok();
}

pub fn add_tracing_layer(app: Router) -> Router {
    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().include_headers(false))
                    .on_request(trace::DefaultOnRequest::new())
                    .on_response(trace::DefaultOnResponse::new().include_headers(false))
                    .on_failure(trace::DefaultOnFailure::new()),
            ),
    )
}
