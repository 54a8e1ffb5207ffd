use axum::{Extension, Json, extract::State};

use bloodlink_db::RequestFilter;
use bloodlink_types::api::{Claims, Dashboard, DonorSummary, RequestResponse, unread_counts};
use bloodlink_types::models::{RequestStatus, Role, Urgency};

use crate::auth::AppState;
use crate::conversations::conversations_for;
use crate::error::{ApiError, blocking};
use crate::users::current_user;

/// Role-gated landing view. The branch follows the stored role, not the token.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Dashboard>, ApiError> {
    let profile = current_user(&state, &claims).await?;
    let conversations = conversations_for(&state, profile.id).await?;
    let unread_counts = unread_counts(&conversations);

    let db = state.db.clone();
    let user_id = profile.id;
    let blood_group = profile.blood_group;

    let dashboard = match profile.role {
        Role::Donor => {
            let (targeted, matching) = blocking(move || {
                let targeted = db.list_requests(&RequestFilter {
                    donor: Some(user_id),
                    ..Default::default()
                })?;
                let matching = db.list_requests(&RequestFilter {
                    status: Some(RequestStatus::Open),
                    blood_group: Some(blood_group),
                    untargeted: true,
                    ..Default::default()
                })?;
                Ok((targeted, matching))
            })
            .await?;

            Dashboard::Donor {
                profile,
                targeted_requests: targeted.into_iter().map(RequestResponse::from).collect(),
                matching_requests: matching
                    .into_iter()
                    .filter(|r| r.user_id != user_id)
                    .map(RequestResponse::from)
                    .collect(),
                conversations,
                unread_counts,
            }
        }
        role @ (Role::Recipient | Role::Requester) => {
            let (requests, donors) = blocking(move || {
                let requests = db.list_requests(&RequestFilter {
                    owner: Some(user_id),
                    ..Default::default()
                })?;
                Ok((requests, db.available_donors()?))
            })
            .await?;

            let available_donors: Vec<DonorSummary> = donors.iter().map(DonorSummary::from).collect();

            if role == Role::Recipient {
                Dashboard::Recipient {
                    profile,
                    requests: requests.into_iter().map(RequestResponse::from).collect(),
                    available_donors,
                    conversations,
                    unread_counts,
                }
            } else {
                let open_count = requests
                    .iter()
                    .filter(|r| r.status == RequestStatus::Open)
                    .count();
                let emergency_count = requests
                    .iter()
                    .filter(|r| r.urgency == Urgency::Emergency)
                    .count();
                Dashboard::Requester {
                    profile,
                    requests: requests.into_iter().map(RequestResponse::from).collect(),
                    open_count,
                    emergency_count,
                    available_donors,
                    conversations,
                    unread_counts,
                }
            }
        }
    };

    Ok(Json(dashboard))
}
