use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use bloodlink_db::{NewRequest, RequestFilter, RespondOutcome};
use bloodlink_types::api::{
    Claims, ConversationResponse, CreateRequestBody, RequestQuery, RequestResponse,
    RespondRequestBody, RespondResponse,
};
use bloodlink_types::events::GatewayEvent;
use bloodlink_types::models::{BloodGroup, RequestStatus, Role};

use crate::auth::AppState;
use crate::conversations::open_conversation;
use crate::error::{ApiError, blocking};

const REQUIRED_FIELDS: &str = "Please fill in all required fields";

pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let blood_group: BloodGroup = required(body.blood_group.as_deref())
        .and_then(|g| g.parse().ok())
        .ok_or_else(|| ApiError::validation(REQUIRED_FIELDS))?;
    let hospital = required(body.hospital.as_deref()).ok_or_else(|| ApiError::validation(REQUIRED_FIELDS))?;
    let location = required(body.location.as_deref()).ok_or_else(|| ApiError::validation(REQUIRED_FIELDS))?;

    let units_required = body.units_required.unwrap_or(1);
    if units_required == 0 {
        return Err(ApiError::validation("At least one unit is required"));
    }
    if body.donor_id == Some(claims.sub) {
        return Err(ApiError::validation("You cannot address a request to yourself"));
    }

    let new_request = NewRequest {
        id: Uuid::new_v4(),
        user_id: claims.sub,
        donor_id: body.donor_id,
        blood_group,
        hospital: hospital.to_string(),
        location: location.to_string(),
        patient_name: required(body.patient_name.as_deref()).map(str::to_string),
        notes: required(body.notes.as_deref()).map(str::to_string),
        urgency: body.urgency.unwrap_or_default(),
        units_required,
    };

    let db = state.db.clone();
    let request = blocking(move || {
        if let Some(donor_id) = new_request.donor_id {
            let donor = db.get_user(donor_id)?;
            if !donor.is_some_and(|d| d.role == Role::Donor) {
                return Err(ApiError::NotFound("Donor not found"));
            }
        }
        Ok(db.insert_request(&new_request)?)
    })
    .await?;

    info!(
        "{} ({}) posted {} request {} at {}",
        claims.name, claims.sub, request.urgency, request.id, request.hospital
    );

    let response = RequestResponse::from(request);
    let event = GatewayEvent::RequestCreate {
        request: response.clone(),
    };
    match response.request.donor_id {
        Some(donor_id) => state.dispatcher.send_to_user(donor_id, event).await,
        None => state.dispatcher.broadcast(event),
    }

    Ok((StatusCode::CREATED, Json(response)))
}

/// Newest first, optionally narrowed by owner/status and a free-text term.
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    let filter = RequestFilter {
        owner: query.mine.unwrap_or(false).then_some(claims.sub),
        status: query.status,
        ..Default::default()
    };

    let db = state.db.clone();
    let requests = blocking(move || Ok(db.list_requests(&filter)?)).await?;

    let term = query.q.unwrap_or_default();
    Ok(Json(
        requests
            .into_iter()
            .filter(|r| r.matches_term(&term))
            .map(RequestResponse::from)
            .collect(),
    ))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<RequestResponse>, ApiError> {
    let db = state.db.clone();
    let request = blocking(move || {
        db.get_request(request_id)?
            .ok_or(ApiError::NotFound("Request not found"))
    })
    .await?;
    Ok(Json(RequestResponse::from(request)))
}

/// Accept or decline an open request. Accepting opens a conversation with
/// the request owner.
pub async fn respond_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<RespondRequestBody>,
) -> Result<Json<RespondResponse>, ApiError> {
    if !RequestStatus::Open.can_transition_to(body.status) {
        return Err(ApiError::validation("Status must be accepted or declined"));
    }
    if claims.role != Role::Donor {
        return Err(ApiError::Forbidden);
    }

    let db = state.db.clone();
    let responder = claims.sub;
    let status = body.status;
    let request = blocking(move || {
        let request = db
            .get_request(request_id)?
            .ok_or(ApiError::NotFound("Request not found"))?;
        if request.user_id == responder {
            return Err(ApiError::Forbidden);
        }
        if request.donor_id.is_some_and(|d| d != responder) {
            return Err(ApiError::Forbidden);
        }

        match db.respond_request(request_id, status, responder)? {
            RespondOutcome::Updated(request) => Ok(request),
            RespondOutcome::NotOpen(current) => Err(ApiError::Conflict(format!(
                "Request is already {}",
                current.status
            ))),
            RespondOutcome::NotFound => Err(ApiError::NotFound("Request not found")),
        }
    })
    .await?;

    info!("{} ({}) {} request {}", claims.name, claims.sub, request.status, request.id);

    state.dispatcher.broadcast(GatewayEvent::RequestStatusUpdate {
        request_id: request.id,
        status: request.status,
        responded_by: responder,
    });

    let conversation = if request.status == RequestStatus::Accepted {
        let (conversation, _) = open_conversation(&state, responder, request.user_id, None).await?;
        Some(ConversationResponse::for_viewer(conversation, responder))
    } else {
        None
    };

    Ok(Json(RespondResponse {
        request: RequestResponse::from(request),
        conversation,
    }))
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
