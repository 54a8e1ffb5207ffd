use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    BloodGroup, BloodRequest, Conversation, LocationInput, RequestStatus, Role, Urgency, User,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
/// `jti` names the session row that must still exist for the token to be valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub jti: Uuid,
    pub exp: usize,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// -- Auth --

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub lga: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl RegisterRequest {
    pub fn location_input(&self) -> LocationInput {
        LocationInput {
            state: self.state.clone(),
            lga: self.lga.clone(),
            location: self.location.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub blood_group: BloodGroup,
    pub location: String,
    pub role: Role,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            blood_group: user.blood_group,
            location: user.location.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

// -- Donor search --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DonorQuery {
    pub blood_group: Option<String>,
    pub state: Option<String>,
    pub lga: Option<String>,
    pub location: Option<String>,
}

impl DonorQuery {
    pub fn location_input(&self) -> LocationInput {
        LocationInput {
            state: self.state.clone(),
            lga: self.lga.clone(),
            location: self.location.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonorSummary {
    pub id: Uuid,
    pub name: String,
    pub blood_group: BloodGroup,
    pub location: String,
    pub state: Option<String>,
    pub lga: Option<String>,
    pub is_available: bool,
}

impl From<&User> for DonorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            blood_group: user.blood_group,
            location: user.location.clone(),
            state: user.state.clone(),
            lga: user.lga.clone(),
            is_available: user.is_available,
        }
    }
}

// -- Requests --

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRequestBody {
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub hospital: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub units_required: Option<u32>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Addresses the request to one donor instead of the open board.
    #[serde(default)]
    pub donor_id: Option<Uuid>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RequestQuery {
    pub q: Option<String>,
    pub mine: Option<bool>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResponse {
    #[serde(flatten)]
    pub request: BloodRequest,
    pub badge: String,
}

impl From<BloodRequest> for RequestResponse {
    fn from(request: BloodRequest) -> Self {
        let badge = request.urgency.badge().to_string();
        Self { request, badge }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondRequestBody {
    pub status: RequestStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondResponse {
    pub request: RequestResponse,
    /// Set when accepting opened (or reused) a conversation with the owner.
    pub conversation: Option<ConversationResponse>,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    pub participant_id: Uuid,
    #[serde(default)]
    pub first_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread: bool,
}

impl ConversationResponse {
    pub fn for_viewer(conversation: Conversation, viewer: Uuid) -> Self {
        let unread = conversation.is_unread_for(viewer);
        Self {
            conversation,
            unread,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartConversationResponse {
    pub conversation: ConversationResponse,
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

// -- Dashboard --

/// Unread count per conversation id: 1 when the last message is unread by
/// the viewer, absent otherwise.
pub type UnreadCounts = HashMap<Uuid, u32>;

pub fn unread_counts(conversations: &[ConversationResponse]) -> UnreadCounts {
    conversations
        .iter()
        .filter(|c| c.unread)
        .map(|c| (c.conversation.id, 1))
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Donor {
        profile: User,
        /// Requests addressed directly to this donor.
        targeted_requests: Vec<RequestResponse>,
        /// Open board requests for the donor's blood group.
        matching_requests: Vec<RequestResponse>,
        conversations: Vec<ConversationResponse>,
        unread_counts: UnreadCounts,
    },
    Recipient {
        profile: User,
        requests: Vec<RequestResponse>,
        available_donors: Vec<DonorSummary>,
        conversations: Vec<ConversationResponse>,
        unread_counts: UnreadCounts,
    },
    Requester {
        profile: User,
        requests: Vec<RequestResponse>,
        open_count: usize,
        emergency_count: usize,
        available_donors: Vec<DonorSummary>,
        conversations: Vec<ConversationResponse>,
        unread_counts: UnreadCounts,
    },
}
