use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use bloodlink_types::api::{
    Claims, ConversationResponse, SendMessageRequest, StartConversationRequest,
    StartConversationResponse,
};
use bloodlink_types::events::GatewayEvent;
use bloodlink_types::models::{Conversation, Message};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

const UNKNOWN_USER: &str = "Unknown User";

/// Create-or-reuse the conversation between `me` and `other`, then append
/// the optional first message as a separate write. Returns `(conversation, created)`.
pub(crate) async fn open_conversation(
    state: &AppState,
    me: Uuid,
    other: Uuid,
    first_message: Option<String>,
) -> Result<(Conversation, bool), ApiError> {
    if me == other {
        return Err(ApiError::validation(
            "You cannot start a conversation with yourself",
        ));
    }

    let db = state.db.clone();
    let (conversation, created) = blocking(move || {
        let other_user = db.get_user(other)?.ok_or(ApiError::NotFound("User not found"))?;
        let my_name = db
            .get_user(me)?
            .map(|u| u.name)
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        Ok(db.get_or_create_conversation((me, &my_name), (other, &other_user.name))?)
    })
    .await?;

    if created {
        info!("Conversation {} created between {} and {}", conversation.id, me, other);
    }

    let text = first_message
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let conversation = match text {
        Some(text) => {
            let (conversation, _) = append(state, conversation.id, me, text).await?;
            conversation
        }
        None => {
            if created {
                notify_participants(state, &conversation).await;
            }
            conversation
        }
    };

    Ok((conversation, created))
}

/// Push the current conversation state to both participants, each with
/// their own unread flag.
pub(crate) async fn notify_participants(state: &AppState, conversation: &Conversation) {
    for participant in conversation.participants {
        state
            .dispatcher
            .send_to_user(
                participant,
                GatewayEvent::ConversationUpdate {
                    conversation: ConversationResponse::for_viewer(conversation.clone(), participant),
                },
            )
            .await;
    }
}

async fn load_for_participant(
    state: &AppState,
    conversation_id: Uuid,
    me: Uuid,
) -> Result<Conversation, ApiError> {
    let db = state.db.clone();
    let conversation = blocking(move || {
        db.get_conversation(conversation_id)?
            .ok_or(ApiError::NotFound("Conversation not found"))
    })
    .await?;

    if !conversation.includes(me) {
        return Err(ApiError::Forbidden);
    }
    Ok(conversation)
}

/// Append a message and fan out `MessageCreate` + `ConversationUpdate`.
async fn append(
    state: &AppState,
    conversation_id: Uuid,
    sender: Uuid,
    text: String,
) -> Result<(Conversation, Message), ApiError> {
    let db = state.db.clone();
    let (updated, message) = blocking(move || {
        let sender_name = db
            .get_user(sender)?
            .map(|u| u.name)
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        let message = db.append_message(
            conversation_id,
            sender,
            &sender_name,
            &text,
            chrono::Utc::now(),
        )?;
        let updated = db
            .get_conversation(conversation_id)?
            .ok_or(ApiError::NotFound("Conversation not found"))?;
        Ok((updated, message))
    })
    .await?;

    for participant in updated.participants {
        state
            .dispatcher
            .send_to_user(
                participant,
                GatewayEvent::MessageCreate {
                    message: message.clone(),
                },
            )
            .await;
    }
    notify_participants(state, &updated).await;

    Ok((updated, message))
}

pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (conversation, created) =
        open_conversation(&state, claims.sub, req.participant_id, req.first_message).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(StartConversationResponse {
            conversation: ConversationResponse::for_viewer(conversation, claims.sub),
            created,
        }),
    ))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    Ok(Json(conversations_for(&state, claims.sub).await?))
}

pub(crate) async fn conversations_for(
    state: &AppState,
    user_id: Uuid,
) -> Result<Vec<ConversationResponse>, ApiError> {
    let db = state.db.clone();
    let conversations = blocking(move || Ok(db.conversations_for_user(user_id)?)).await?;
    Ok(conversations
        .into_iter()
        .map(|c| ConversationResponse::for_viewer(c, user_id))
        .collect())
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    load_for_participant(&state, conversation_id, claims.sub).await?;

    let db = state.db.clone();
    let messages = blocking(move || Ok(db.get_messages(conversation_id)?)).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::validation("Message cannot be empty"));
    }

    load_for_participant(&state, conversation_id, claims.sub).await?;
    let (_, message) = append(&state, conversation_id, claims.sub, text).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark the last message read for the caller. No-op when there is nothing
/// unread for them.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    load_for_participant(&state, conversation_id, claims.sub).await?;

    let db = state.db.clone();
    let reader = claims.sub;
    let updated = blocking(move || {
        if !db.mark_read(conversation_id, reader)? {
            return Ok(None);
        }
        Ok(db.get_conversation(conversation_id)?)
    })
    .await?;

    match updated {
        Some(conversation) => notify_participants(&state, &conversation).await,
        None => debug!("mark_read on {} by {}: nothing unread", conversation_id, reader),
    }

    Ok(StatusCode::NO_CONTENT)
}
