use axum::{
    Json,
    extract::{Query, State},
};
use tracing::debug;

use bloodlink_types::api::{DonorQuery, DonorSummary};
use bloodlink_types::models::BloodGroup;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// Exact-match donor search: blood group plus the optional location string.
/// No pagination or ranking; every match is returned.
pub async fn search_donors(
    State(state): State<AppState>,
    Query(query): Query<DonorQuery>,
) -> Result<Json<Vec<DonorSummary>>, ApiError> {
    let blood_group: BloodGroup = query
        .blood_group
        .as_deref()
        .and_then(|g| g.parse().ok())
        .ok_or_else(|| ApiError::validation("Please select a blood group"))?;
    let location = query.location_input().filter_string();

    debug!("Donor search: {} @ {:?}", blood_group, location);

    let db = state.db.clone();
    let donors = blocking(move || Ok(db.search_donors(blood_group, location.as_deref())?)).await?;

    Ok(Json(donors.iter().map(DonorSummary::from).collect()))
}
