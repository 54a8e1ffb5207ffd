use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use bloodlink_db::{Database, NewUser};
use bloodlink_gateway::dispatcher::Dispatcher;
use bloodlink_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use bloodlink_types::auth_error::AuthErrorCode;
use bloodlink_types::models::{BloodGroup, Role, User};

use crate::error::{ApiError, blocking};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_FAILED_LOGINS: u32 = 5;
const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub dispatcher: Dispatcher,
    pub login_limiter: LoginLimiter,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, jwt_secret: String, token_ttl: chrono::Duration, dispatcher: Dispatcher) -> Self {
        Self {
            db,
            jwt_secret,
            token_ttl,
            dispatcher,
            login_limiter: LoginLimiter::default(),
        }
    }
}

/// Failed-login counter per email over a fixed window.
#[derive(Default)]
pub struct LoginLimiter {
    failures: Mutex<HashMap<String, (u32, Instant)>>,
}

impl LoginLimiter {
    pub fn is_blocked(&self, email: &str) -> bool {
        self.is_blocked_at(email, Instant::now())
    }

    pub fn record_failure(&self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    pub fn clear(&self, email: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(&email.to_lowercase());
        }
    }

    fn is_blocked_at(&self, email: &str, now: Instant) -> bool {
        let Ok(mut failures) = self.failures.lock() else {
            return false;
        };
        let key = email.to_lowercase();
        match failures.get(&key) {
            Some(&(_, since)) if now.duration_since(since) >= LOGIN_WINDOW => {
                failures.remove(&key);
                false
            }
            Some(&(count, _)) => count >= MAX_FAILED_LOGINS,
            None => false,
        }
    }

    fn record_failure_at(&self, email: &str, now: Instant) {
        let Ok(mut failures) = self.failures.lock() else {
            return;
        };
        failures.retain(|_, (_, since)| now.duration_since(*since) < LOGIN_WINDOW);
        failures.entry(email.to_lowercase()).or_insert((0, now)).0 += 1;
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let blood_group: BloodGroup = req
        .blood_group
        .as_deref()
        .and_then(|g| g.parse().ok())
        .ok_or_else(|| ApiError::validation("Please select a blood group"))?;

    let location = req.location_input().filter_string().ok_or_else(|| {
        ApiError::validation("Please provide a location (state/LGA or specific location)")
    })?;

    let email = req.email.trim().to_string();
    if !is_valid_email(&email) {
        return Err(ApiError::Auth(AuthErrorCode::InvalidEmail));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Auth(AuthErrorCode::WeakPassword));
    }

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("Please enter your name"));
    }

    let role = req.role.unwrap_or_default();
    let new_user = NewUser {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash: String::new(),
        blood_group,
        location,
        state: trimmed(req.state.as_deref()),
        lga: trimmed(req.lga.as_deref()),
        role,
        is_available: role == Role::Donor,
    };
    let password = req.password;

    let db = state.db.clone();
    let user = blocking(move || {
        if db.get_user_by_email(&new_user.email)?.is_some() {
            return Err(ApiError::Auth(AuthErrorCode::EmailAlreadyInUse));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        db.create_user(&NewUser {
            password_hash,
            ..new_user
        })?
        .ok_or(ApiError::Auth(AuthErrorCode::EmailAlreadyInUse))
    })
    .await?;

    let token = start_session(&state, &user).await?;
    info!("Registered {} ({}) as {}", user.name, user.id, user.role);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            role: user.role,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    if state.login_limiter.is_blocked(&email) {
        return Err(ApiError::Auth(AuthErrorCode::TooManyRequests));
    }

    let db = state.db.clone();
    let lookup_email = email.clone();
    let verified = blocking(move || {
        let Some(row) = db.get_user_by_email(&lookup_email)? else {
            return Ok(Err(AuthErrorCode::UserNotFound));
        };

        // Verify password
        let parsed_hash = PasswordHash::new(&row.password)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Ok(Err(AuthErrorCode::WrongPassword));
        }

        Ok(Ok(User::try_from(&row)?))
    })
    .await?;

    let user = match verified {
        Ok(user) => user,
        Err(code) => {
            state.login_limiter.record_failure(&email);
            warn!("Failed login for {}: {}", email, code.as_str());
            return Err(ApiError::Auth(code));
        }
    };
    state.login_limiter.clear(&email);

    let token = start_session(&state, &user).await?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        name: user.name,
        role: user.role,
        token,
    }))
}

/// Revokes the session behind the presented token.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let db = state.db.clone();
    let sid = claims.jti;
    blocking(move || Ok(db.delete_session(sid)?)).await?;
    let closed = state.dispatcher.disconnect_session(sid).await;
    info!("{} ({}) logged out, {} gateway connection(s) closed", claims.name, claims.sub, closed);
    Ok(StatusCode::NO_CONTENT)
}

async fn start_session(state: &AppState, user: &User) -> Result<String, ApiError> {
    let session_id = Uuid::new_v4();
    let db = state.db.clone();
    let user_id = user.id;
    blocking(move || Ok(db.create_session(session_id, user_id)?)).await?;

    Ok(create_token(
        &state.jwt_secret,
        state.token_ttl,
        user,
        session_id,
    )?)
}

fn create_token(
    secret: &str,
    ttl: chrono::Duration,
    user: &User,
    session_id: Uuid,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        role: user.role,
        jti: session_id,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.ng"));
        assert!(!is_valid_email("ada"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@.com"));
        assert!(!is_valid_email("ada@@example.com"));
        assert!(!is_valid_email("ada @example.com"));
    }

    #[test]
    fn limiter_blocks_after_repeated_failures() {
        let limiter = LoginLimiter::default();
        let start = Instant::now();
        for _ in 0..MAX_FAILED_LOGINS - 1 {
            limiter.record_failure_at("Ada@Example.com", start);
        }
        assert!(!limiter.is_blocked_at("ada@example.com", start));

        limiter.record_failure_at("ada@example.com", start);
        assert!(limiter.is_blocked_at("ADA@example.com", start));
        assert!(!limiter.is_blocked_at("bola@example.com", start));

        // the window passing lifts the block
        assert!(!limiter.is_blocked_at("ada@example.com", start + LOGIN_WINDOW));
    }

    #[test]
    fn limiter_forgets_expired_emails() {
        let limiter = LoginLimiter::default();
        let start = Instant::now();
        for i in 0..1000 {
            limiter.record_failure_at(&format!("user{}@example.com", i), start);
        }
        assert_eq!(limiter.failures.lock().unwrap().len(), 1000);

        limiter.record_failure_at("late@example.com", start + LOGIN_WINDOW * 4);
        let failures = limiter.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.get("late@example.com").map(|e| e.0), Some(1));
    }

    #[test]
    fn limiter_clears_on_success() {
        let limiter = LoginLimiter::default();
        let now = Instant::now();
        for _ in 0..MAX_FAILED_LOGINS {
            limiter.record_failure_at("ada@example.com", now);
        }
        assert!(limiter.is_blocked_at("ada@example.com", now));
        limiter.clear("ada@example.com");
        assert!(!limiter.is_blocked_at("ada@example.com", now));
    }
}
