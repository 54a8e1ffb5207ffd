use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;

use bloodlink_types::api::{AvailabilityRequest, Claims, PublicProfile};
use bloodlink_types::models::{Role, User};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// Load the caller's user record. A valid session for a deleted user counts
/// as logged out.
pub(crate) async fn current_user(state: &AppState, claims: &Claims) -> Result<User, ApiError> {
    let db = state.db.clone();
    let uid = claims.sub;
    blocking(move || db.get_user(uid)?.ok_or(ApiError::Unauthorized)).await
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(current_user(&state, &claims).await?))
}

pub async fn set_availability(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<User>, ApiError> {
    let user = current_user(&state, &claims).await?;
    if user.role != Role::Donor {
        return Err(ApiError::validation("Only donors can change availability"));
    }

    let db = state.db.clone();
    let uid = user.id;
    let updated = blocking(move || {
        db.set_availability(uid, req.is_available)?;
        db.get_user(uid)?.ok_or(ApiError::Unauthorized)
    })
    .await?;

    info!("{} ({}) availability -> {}", updated.name, updated.id, updated.is_available);
    Ok(Json(updated))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PublicProfile>, ApiError> {
    let db = state.db.clone();
    let user = blocking(move || db.get_user(user_id)?.ok_or(ApiError::NotFound("User not found"))).await?;
    Ok(Json(PublicProfile::from(&user)))
}
