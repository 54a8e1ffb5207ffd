use tracing::{debug, info, warn};
use uuid::Uuid;

use bloodlink_types::api::{
    AvailabilityRequest, ConversationResponse, CreateRequestBody, Dashboard, RequestQuery,
    RequestResponse, RespondRequestBody, RespondResponse, SendMessageRequest,
    StartConversationRequest, StartConversationResponse,
};
use bloodlink_types::events::GatewayEvent;
use bloodlink_types::models::{LastMessage, Message, RequestStatus, Role, User};

use crate::client::Client;
use crate::error::ClientError;
use crate::gateway::Gateway;

/// A logged-in user plus the state the UI renders from.
#[derive(Debug)]
pub struct Session {
    client: Client,
    token: Option<String>,
    user_id: Uuid,
    name: String,
    role: Option<Role>,
    conversations: Vec<ConversationResponse>,
    requests: Vec<RequestResponse>,
}

impl Session {
    pub(crate) fn new(client: Client, token: String, user_id: Uuid, name: String, role: Role) -> Self {
        Self {
            client,
            token: Some(token),
            user_id,
            name,
            role: Some(role),
            conversations: Vec::new(),
            requests: Vec::new(),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` after logout.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Cached conversations, most recently updated first.
    pub fn conversations(&self) -> &[ConversationResponse] {
        &self.conversations
    }

    /// Cached requests, newest first.
    pub fn requests(&self) -> &[RequestResponse] {
        &self.requests
    }

    fn auth(&self) -> Result<&str, ClientError> {
        self.token.as_deref().ok_or(ClientError::NotLoggedIn)
    }

    // -- Profile --

    pub async fn me(&mut self) -> Result<User, ClientError> {
        let token = self.auth()?;
        let user: User = self
            .client
            .send(self.client.http().get(self.client.url("/users/me")), Some(token))
            .await?;
        self.role = Some(user.role);
        Ok(user)
    }

    pub async fn set_availability(&self, is_available: bool) -> Result<User, ClientError> {
        let token = self.auth()?;
        let body = AvailabilityRequest { is_available };
        self.client
            .send(
                self.client.http().put(self.client.url("/users/me/availability")).json(&body),
                Some(token),
            )
            .await
    }

    /// Fetch the role-specific dashboard and seed the cache from it.
    pub async fn dashboard(&mut self) -> Result<Dashboard, ClientError> {
        let token = self.auth()?;
        let dashboard: Dashboard = self
            .client
            .send(self.client.http().get(self.client.url("/dashboard")), Some(token))
            .await?;

        match &dashboard {
            Dashboard::Donor {
                profile,
                targeted_requests,
                matching_requests,
                conversations,
                ..
            } => {
                self.role = Some(profile.role);
                self.requests = targeted_requests
                    .iter()
                    .chain(matching_requests)
                    .cloned()
                    .collect();
                self.conversations = conversations.clone();
            }
            Dashboard::Recipient {
                profile,
                requests,
                conversations,
                ..
            }
            | Dashboard::Requester {
                profile,
                requests,
                conversations,
                ..
            } => {
                self.role = Some(profile.role);
                self.requests = requests.clone();
                self.conversations = conversations.clone();
            }
        }
        sort_requests(&mut self.requests);
        Ok(dashboard)
    }

    // -- Conversations --

    pub async fn refresh_conversations(&mut self) -> Result<&[ConversationResponse], ClientError> {
        let token = self.auth()?;
        let conversations: Vec<ConversationResponse> = self
            .client
            .send(self.client.http().get(self.client.url("/conversations")), Some(token))
            .await?;
        self.conversations = conversations;
        Ok(&self.conversations)
    }

    /// Reuse the cached conversation with `other` if there is one, otherwise
    /// ask the server to create or find it. A non-blank `first_message` is
    /// sent either way.
    pub async fn contact(
        &mut self,
        other: Uuid,
        first_message: Option<&str>,
    ) -> Result<ConversationResponse, ClientError> {
        self.auth()?;
        let cached = self
            .conversations
            .iter()
            .find(|c| c.conversation.is_between(self.user_id, other))
            .cloned();
        if let Some(existing) = cached {
            let conversation_id = existing.conversation.id;
            debug!("Reusing cached conversation {} with {}", conversation_id, other);
            if let Some(text) = first_message.map(str::trim).filter(|t| !t.is_empty()) {
                self.send_message(conversation_id, text).await?;
            }
            return Ok(self
                .conversations
                .iter()
                .find(|c| c.conversation.id == conversation_id)
                .cloned()
                .unwrap_or(existing));
        }

        let token = self.auth()?;
        let body = StartConversationRequest {
            participant_id: other,
            first_message: first_message.map(str::to_string),
        };
        let resp: StartConversationResponse = self
            .client
            .send(
                self.client.http().post(self.client.url("/conversations")).json(&body),
                Some(token),
            )
            .await?;
        if resp.created {
            info!("Started conversation {} with {}", resp.conversation.conversation.id, other);
        }
        self.upsert_conversation(resp.conversation.clone());
        Ok(resp.conversation)
    }

    /// Load the message history and mark the conversation read. The read
    /// marker is best-effort: a failure is logged and the messages are still
    /// returned.
    pub async fn open_conversation(&mut self, conversation_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let token = self.auth()?.to_string();
        let messages: Vec<Message> = self
            .client
            .send(
                self.client
                    .http()
                    .get(self.client.url(&format!("/conversations/{}/messages", conversation_id))),
                Some(&token),
            )
            .await?;

        let read = self
            .client
            .send_empty(
                self.client
                    .http()
                    .post(self.client.url(&format!("/conversations/{}/read", conversation_id))),
                Some(&token),
            )
            .await;
        match read {
            Ok(()) => self.mark_read_locally(conversation_id),
            Err(e) => warn!("Failed to mark conversation {} read: {}", conversation_id, e),
        }

        Ok(messages)
    }

    pub async fn send_message(&mut self, conversation_id: Uuid, text: &str) -> Result<Message, ClientError> {
        let token = self.auth()?;
        let body = SendMessageRequest {
            text: text.to_string(),
        };
        let message: Message = self
            .client
            .send(
                self.client
                    .http()
                    .post(self.client.url(&format!("/conversations/{}/messages", conversation_id)))
                    .json(&body),
                Some(token),
            )
            .await?;
        self.apply_message(&message);
        Ok(message)
    }

    // -- Requests --

    pub async fn post_request(&mut self, body: &CreateRequestBody) -> Result<RequestResponse, ClientError> {
        let token = self.auth()?;
        let request: RequestResponse = self
            .client
            .send(self.client.http().post(self.client.url("/requests")).json(body), Some(token))
            .await?;
        self.upsert_request(request.clone());
        Ok(request)
    }

    /// Replace the cached requests with a fresh listing.
    pub async fn refresh_requests(&mut self, query: &RequestQuery) -> Result<&[RequestResponse], ClientError> {
        let token = self.auth()?;
        let requests: Vec<RequestResponse> = self
            .client
            .send(self.client.http().get(self.client.url("/requests")).query(query), Some(token))
            .await?;
        self.requests = requests;
        Ok(&self.requests)
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<RequestResponse, ClientError> {
        let token = self.auth()?;
        self.client
            .send(
                self.client.http().get(self.client.url(&format!("/requests/{}", request_id))),
                Some(token),
            )
            .await
    }

    pub async fn respond(&mut self, request_id: Uuid, status: RequestStatus) -> Result<RespondResponse, ClientError> {
        let token = self.auth()?;
        let body = RespondRequestBody { status };
        let resp: RespondResponse = self
            .client
            .send(
                self.client
                    .http()
                    .post(self.client.url(&format!("/requests/{}/respond", request_id)))
                    .json(&body),
                Some(token),
            )
            .await?;
        self.upsert_request(resp.request.clone());
        if let Some(conversation) = &resp.conversation {
            self.upsert_conversation(conversation.clone());
        }
        Ok(resp)
    }

    // -- Gateway --

    pub async fn connect_gateway(&self) -> Result<Gateway, ClientError> {
        let token = self.auth()?;
        Gateway::connect(self.client.base_url(), token).await
    }

    /// Fold a gateway event into the cache. Applying the same event twice
    /// leaves the cache unchanged.
    pub fn apply_event(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Ready { .. } => {}
            GatewayEvent::MessageCreate { message } => self.apply_message(message),
            GatewayEvent::ConversationUpdate { conversation } => {
                let newer_cached = self.conversations.iter().any(|c| {
                    c.conversation.id == conversation.conversation.id
                        && c.conversation.last_updated > conversation.conversation.last_updated
                });
                if !newer_cached {
                    self.upsert_conversation(conversation.clone());
                }
            }
            GatewayEvent::RequestCreate { request } => {
                if !self.requests.iter().any(|r| r.request.id == request.request.id) {
                    self.requests.push(request.clone());
                    sort_requests(&mut self.requests);
                }
            }
            GatewayEvent::RequestStatusUpdate {
                request_id,
                status,
                responded_by,
            } => {
                if let Some(cached) = self.requests.iter_mut().find(|r| r.request.id == *request_id) {
                    if cached.request.status.can_transition_to(*status) {
                        cached.request.status = *status;
                        cached.request.responded_by = Some(*responded_by);
                    }
                }
            }
        }
    }

    // -- Logout --

    /// Revoke the server session and drop everything cached for this user.
    /// The local state is cleared even if the server call fails.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let token = self.auth()?.to_string();
        let result = self
            .client
            .send_empty(self.client.http().post(self.client.url("/auth/logout")), Some(&token))
            .await;
        self.clear();
        info!("Logged out {}", self.user_id);
        result
    }

    fn clear(&mut self) {
        self.token = None;
        self.role = None;
        self.conversations.clear();
        self.requests.clear();
    }

    fn upsert_conversation(&mut self, conversation: ConversationResponse) {
        match self
            .conversations
            .iter_mut()
            .find(|c| c.conversation.id == conversation.conversation.id)
        {
            Some(cached) => *cached = conversation,
            None => self.conversations.push(conversation),
        }
        self.conversations
            .sort_by(|a, b| b.conversation.last_updated.cmp(&a.conversation.last_updated));
    }

    fn upsert_request(&mut self, request: RequestResponse) {
        match self.requests.iter_mut().find(|r| r.request.id == request.request.id) {
            Some(cached) => *cached = request,
            None => self.requests.push(request),
        }
        sort_requests(&mut self.requests);
    }

    /// Only a message newer than the cached state moves `last_message`.
    fn apply_message(&mut self, message: &Message) {
        let me = self.user_id;
        let Some(cached) = self
            .conversations
            .iter_mut()
            .find(|c| c.conversation.id == message.conversation_id)
        else {
            return;
        };
        if message.timestamp <= cached.conversation.last_updated {
            return;
        }

        cached.conversation.last_message = Some(LastMessage {
            text: message.text.clone(),
            sender: message.sender,
            sender_name: message.sender_name.clone(),
            timestamp: message.timestamp,
            read: false,
            read_at: None,
        });
        cached.conversation.last_updated = message.timestamp;
        cached.unread = message.sender != me;
        self.conversations
            .sort_by(|a, b| b.conversation.last_updated.cmp(&a.conversation.last_updated));
    }

    fn mark_read_locally(&mut self, conversation_id: Uuid) {
        let me = self.user_id;
        if let Some(cached) = self
            .conversations
            .iter_mut()
            .find(|c| c.conversation.id == conversation_id)
        {
            if let Some(last) = cached.conversation.last_message.as_mut() {
                if last.sender != me && !last.read {
                    last.read = true;
                    last.read_at = Some(chrono::Utc::now());
                }
            }
            cached.unread = false;
        }
    }
}

fn sort_requests(requests: &mut [RequestResponse]) {
    requests.sort_by(|a, b| b.request.created_at.cmp(&a.request.created_at));
}
