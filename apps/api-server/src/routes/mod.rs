mod upload;

use crate::{ctx::Ctx, upload::STATIC_URL_PREFIX};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub fn get_routes(ctx: Ctx, max_upload_size: usize) -> Router {
    let static_service = ServeDir::new(ctx.storage().root());

    Router::new()
        .route(
            "/",
            get(|| async { concat!("media-insight ", env!("CARGO_PKG_VERSION")) }),
        )
        .route("/upload", post(upload::upload_files))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .nest_service(STATIC_URL_PREFIX, static_service)
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
