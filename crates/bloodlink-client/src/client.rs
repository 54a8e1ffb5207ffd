use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use bloodlink_types::api::{
    DonorQuery, DonorSummary, ErrorBody, LoginRequest, LoginResponse, PublicProfile,
    RegisterRequest, RegisterResponse,
};

use crate::error::ClientError;
use crate::session::Session;

/// HTTP access to one Bloodlink server.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<Session, ClientError> {
        let resp: RegisterResponse = self
            .send(self.http.post(self.url("/auth/register")).json(req), None)
            .await?;
        info!("Registered as {} ({})", resp.user_id, resp.role);
        Ok(Session::new(
            self.clone(),
            resp.token,
            resp.user_id,
            req.name.trim().to_string(),
            resp.role,
        ))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp: LoginResponse = self
            .send(self.http.post(self.url("/auth/login")).json(&body), None)
            .await?;
        info!("Logged in as {} ({})", resp.name, resp.user_id);
        Ok(Session::new(self.clone(), resp.token, resp.user_id, resp.name, resp.role))
    }

    /// Donor search needs no account.
    pub async fn search_donors(&self, query: &DonorQuery) -> Result<Vec<DonorSummary>, ClientError> {
        self.send(self.http.get(self.url("/donors")).query(query), None).await
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<PublicProfile, ClientError> {
        self.send(self.http.get(self.url(&format!("/users/{}", user_id))), None)
            .await
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        token: Option<&str>,
    ) -> Result<T, ClientError> {
        let resp = checked(authorize(builder, token).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// For endpoints that answer 204.
    pub(crate) async fn send_empty(
        &self,
        builder: RequestBuilder,
        token: Option<&str>,
    ) -> Result<(), ClientError> {
        checked(authorize(builder, token).send().await?).await?;
        Ok(())
    }
}

fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

async fn checked(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.message),
        Err(_) => ("http".to_string(), text),
    };
    debug!("{} -> {} {}", status, code, message);
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}
