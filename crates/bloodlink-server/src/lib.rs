pub mod config;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use bloodlink_api::AppState;
use bloodlink_gateway::connection::{self, GatewayAuth};
use bloodlink_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    auth: GatewayAuth,
}

/// REST routes plus the `/gateway` WebSocket upgrade, with CORS and HTTP tracing.
pub fn app(state: AppState) -> Router {
    let gateway = GatewayState {
        dispatcher: state.dispatcher.clone(),
        auth: GatewayAuth {
            jwt_secret: state.jwt_secret.clone(),
            db: state.db.clone(),
        },
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    bloodlink_api::router(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, state.auth))
}
