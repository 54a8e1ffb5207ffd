use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ConversationResponse, RequestResponse};
use crate::models::{Message, RequestStatus};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A message was appended to one of the recipient's conversations
    MessageCreate { message: Message },

    /// A conversation was created or its last message/read state changed.
    /// Delivered per participant, so `unread` is computed for the receiver.
    ConversationUpdate { conversation: ConversationResponse },

    /// A request was posted to the board
    RequestCreate { request: RequestResponse },

    /// A request was accepted or declined
    RequestStatusUpdate {
        request_id: Uuid,
        status: RequestStatus,
        responded_by: Uuid,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_adjacent_tagging() {
        let id = Uuid::new_v4();
        let event = GatewayEvent::RequestStatusUpdate {
            request_id: id,
            status: RequestStatus::Accepted,
            responded_by: id,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "RequestStatusUpdate");
        assert_eq!(value["data"]["status"], "accepted");
    }

    #[test]
    fn identify_parses_from_client_json() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Identify","data":{"token":"abc"}}"#).unwrap();
        let GatewayCommand::Identify { token } = cmd;
        assert_eq!(token, "abc");
    }
}
