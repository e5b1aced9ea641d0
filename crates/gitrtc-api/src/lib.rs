pub mod handlers;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Signaling socket plus the JSON status API.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers))
        .with_state(state.clone());

    Router::new()
        .route("/ws", get(ws::handle_upgrade))
        .route("/git-rtc-ws", get(ws::handle_upgrade))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(cors)
}

pub async fn serve(state: ApiState, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
    tracing::info!(bind, port, "signaling server listening");
    serve_on(listener, state).await
}

/// Serve on an already bound listener (tests bind port 0).
pub async fn serve_on(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}
