//! Integration tests: run the full server on an ephemeral port and drive it
//! through the client library.

use std::sync::Arc;
use std::time::Duration;

use bloodlink_api::AppStateInner;
use bloodlink_client::{Client, ClientError, Gateway, Session};
use bloodlink_db::Database;
use bloodlink_gateway::dispatcher::Dispatcher;
use bloodlink_types::api::{CreateRequestBody, DonorQuery, RegisterRequest, RequestQuery};
use bloodlink_types::events::GatewayEvent;
use bloodlink_types::models::{RequestStatus, Role, Urgency};

async fn spawn_server() -> Client {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state = Arc::new(AppStateInner::new(
        db,
        "client-test-secret".to_string(),
        chrono::Duration::days(1),
        Dispatcher::new(),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, bloodlink_server::app(state)).await.unwrap();
    });
    Client::new(format!("http://{}", addr))
}

async fn register(client: &Client, name: &str, role: Role, blood_group: &str) -> Session {
    client
        .register(&RegisterRequest {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password: "secret-pass".to_string(),
            blood_group: Some(blood_group.to_string()),
            role: Some(role),
            state: Some("Lagos".to_string()),
            lga: Some("Ikeja".to_string()),
            location: None,
        })
        .await
        .unwrap()
}

fn emergency_request() -> CreateRequestBody {
    CreateRequestBody {
        blood_group: Some("O-".to_string()),
        hospital: Some("General Hospital".to_string()),
        location: Some("Ikeja, Lagos".to_string()),
        urgency: Some(Urgency::Emergency),
        units_required: Some(2),
        ..Default::default()
    }
}

/// Next event that is not for some other concern, within a bounded wait.
async fn next_matching(
    gateway: &mut Gateway,
    mut wanted: impl FnMut(&GatewayEvent) -> bool,
) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = gateway.next_event().await.unwrap().expect("gateway closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for gateway event")
}

#[tokio::test]
async fn register_keeps_role_and_logout_clears_everything() {
    let client = spawn_server().await;
    let donor = register(&client, "Bola", Role::Donor, "O-").await;
    let mut recipient = register(&client, "Ada", Role::Recipient, "O-").await;
    assert_eq!(recipient.role(), Some(Role::Recipient));
    assert_eq!(recipient.me().await.unwrap().role, Role::Recipient);

    recipient.post_request(&emergency_request()).await.unwrap();
    recipient.contact(donor.user_id(), Some("Hello")).await.unwrap();
    assert_eq!(recipient.requests().len(), 1);
    assert_eq!(recipient.conversations().len(), 1);

    let old_token = recipient.token().unwrap().to_string();
    recipient.logout().await.unwrap();
    assert_eq!(recipient.role(), None);
    assert!(recipient.conversations().is_empty());
    assert!(recipient.requests().is_empty());
    assert!(matches!(recipient.me().await, Err(ClientError::NotLoggedIn)));

    let resp = reqwest::Client::new()
        .get(format!("{}/users/me", client.base_url()))
        .bearer_auth(old_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn contact_reuses_one_conversation_from_both_sides() {
    let client = spawn_server().await;
    let mut ada = register(&client, "Ada", Role::Recipient, "O-").await;
    let mut bola = register(&client, "Bola", Role::Donor, "O-").await;

    let first = ada.contact(bola.user_id(), Some("Are you free?")).await.unwrap();
    let again = ada.contact(bola.user_id(), None).await.unwrap();
    assert_eq!(first.conversation.id, again.conversation.id);

    let from_bola = bola.contact(ada.user_id(), None).await.unwrap();
    assert_eq!(from_bola.conversation.id, first.conversation.id);
    assert!(from_bola.unread);

    let messages = bola.open_conversation(first.conversation.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "Are you free?");
    assert!(!bola.conversations()[0].unread);

    let refreshed = bola.refresh_conversations().await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert!(!refreshed[0].unread);
}

#[tokio::test]
async fn requests_flow_and_error_messages() {
    let client = spawn_server().await;
    let mut owner = register(&client, "Ada", Role::Requester, "O-").await;
    let mut donor = register(&client, "Bola", Role::Donor, "O-").await;

    let posted = owner.post_request(&emergency_request()).await.unwrap();
    assert_eq!(posted.badge, "Emergency");
    let fetched = donor.get_request(posted.request.id).await.unwrap();
    assert_eq!(fetched.request.hospital, "General Hospital");

    let hits = donor
        .refresh_requests(&RequestQuery {
            q: Some("general".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let resp = donor.respond(posted.request.id, RequestStatus::Accepted).await.unwrap();
    assert_eq!(resp.request.request.status, RequestStatus::Accepted);
    assert!(resp.conversation.is_some());
    assert_eq!(donor.conversations().len(), 1);

    let err = donor
        .respond(posted.request.id, RequestStatus::Declined)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("conflict"));
    assert_eq!(err.user_message(), "Request is already accepted");

    let err = client.login("ada@example.com", "nope").await.unwrap_err();
    assert_eq!(err.code(), Some("auth/wrong-password"));
    assert_eq!(err.user_message(), "Invalid email or password.");

    let donors = client
        .search_donors(&DonorQuery {
            blood_group: Some("O-".to_string()),
            state: Some("Lagos".to_string()),
            lga: Some("Ikeja".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(donors.len(), 1);
    assert_eq!(donors[0].id, donor.user_id());

    let profile = client.profile(owner.user_id()).await.unwrap();
    assert_eq!(profile.role, Role::Requester);
}

#[tokio::test]
async fn gateway_delivers_board_and_conversation_events() {
    let client = spawn_server().await;
    let mut donor = register(&client, "Bola", Role::Donor, "O-").await;
    let mut owner = register(&client, "Ada", Role::Recipient, "O-").await;

    let mut gateway = donor.connect_gateway().await.unwrap();
    assert_eq!(gateway.user_id(), donor.user_id());
    assert_eq!(gateway.name(), "Bola");

    let posted = owner.post_request(&emergency_request()).await.unwrap();
    let event = next_matching(&mut gateway, |e| matches!(e, GatewayEvent::RequestCreate { .. })).await;
    donor.apply_event(&event);
    donor.apply_event(&event);
    assert_eq!(donor.requests().len(), 1);
    assert_eq!(donor.requests()[0].request.id, posted.request.id);

    let convo = owner.contact(donor.user_id(), Some("Please help")).await.unwrap();
    let event = next_matching(&mut gateway, |e| matches!(e, GatewayEvent::MessageCreate { .. })).await;
    match &event {
        GatewayEvent::MessageCreate { message } => {
            assert_eq!(message.conversation_id, convo.conversation.id);
            assert_eq!(message.text, "Please help");
        }
        other => panic!("unexpected {:?}", other),
    }
    let event = next_matching(&mut gateway, |e| {
        matches!(e, GatewayEvent::ConversationUpdate { conversation } if conversation.conversation.last_message.is_some())
    })
    .await;
    donor.apply_event(&event);
    assert_eq!(donor.conversations().len(), 1);
    assert!(donor.conversations()[0].unread);

    gateway.close().await.unwrap();
}

#[tokio::test]
async fn gateway_rejects_revoked_token() {
    let client = spawn_server().await;
    let mut ada = register(&client, "Ada", Role::Donor, "A+").await;
    let token = ada.token().unwrap().to_string();
    ada.logout().await.unwrap();

    assert!(Gateway::connect(client.base_url(), &token).await.is_err());
}

#[tokio::test]
async fn contact_on_cached_conversation_still_sends_text() {
    let client = spawn_server().await;
    let mut ada = register(&client, "Ada", Role::Recipient, "O-").await;
    let mut bola = register(&client, "Bola", Role::Donor, "O-").await;

    let first = ada.contact(bola.user_id(), Some("first")).await.unwrap();
    let second = ada.contact(bola.user_id(), Some("second")).await.unwrap();
    assert_eq!(first.conversation.id, second.conversation.id);
    assert_eq!(second.conversation.last_message.as_ref().unwrap().text, "second");

    ada.contact(bola.user_id(), Some("   ")).await.unwrap();

    let texts: Vec<String> = bola
        .open_conversation(first.conversation.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, ["first", "second"]);
}

#[tokio::test]
async fn logout_closes_open_gateway_connection() {
    let client = spawn_server().await;
    let mut ada = register(&client, "Ada", Role::Recipient, "O-").await;
    let mut bola = register(&client, "Bola", Role::Donor, "O-").await;
    let bola_id = bola.user_id();

    let mut gateway = bola.connect_gateway().await.unwrap();
    bola.logout().await.unwrap();
    ada.contact(bola_id, Some("private after logout")).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match gateway.next_event().await {
                Ok(Some(GatewayEvent::MessageCreate { message })) => return Some(message.text),
                Ok(Some(GatewayEvent::ConversationUpdate { .. })) => {
                    return Some("conversation update".to_string());
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    })
    .await
    .expect("gateway stayed open after logout");
    assert_eq!(outcome, None);
}
