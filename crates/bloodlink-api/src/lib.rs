pub mod auth;
pub mod conversations;
pub mod dashboard;
pub mod donors;
pub mod error;
pub mod middleware;
pub mod requests;
pub mod users;

use axum::{
    Router,
    routing::{get, post, put},
};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// All REST routes. The server adds the gateway upgrade and HTTP layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/donors", get(donors::search_donors))
        .route("/users/{user_id}", get(users::get_profile));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me))
        .route("/users/me/availability", put(users::set_availability))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/requests", get(requests::list_requests).post(requests::create_request))
        .route("/requests/{request_id}", get(requests::get_request))
        .route("/requests/{request_id}/respond", post(requests::respond_request))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::start_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversations::get_messages).post(conversations::send_message),
        )
        .route("/conversations/{conversation_id}/read", post(conversations::mark_read))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
