use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use bloodlink_types::api::ErrorBody;
use bloodlink_types::auth_error::{AuthErrorCode, GENERIC_MESSAGE};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Form input rejected; the message is shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    #[error("{}", .0.as_str())]
    Auth(AuthErrorCode),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(code) => match code {
                AuthErrorCode::InvalidEmail | AuthErrorCode::WeakPassword => StatusCode::BAD_REQUEST,
                AuthErrorCode::EmailAlreadyInUse => StatusCode::CONFLICT,
                AuthErrorCode::UserNotFound | AuthErrorCode::WrongPassword => {
                    StatusCode::UNAUTHORIZED
                }
                AuthErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (code, message) = match self {
            Self::Validation(msg) => ("invalid_input", msg.clone()),
            Self::Auth(code) => (code.as_str(), code.user_message().to_string()),
            Self::Unauthorized => ("unauthorized", "Please log in to continue.".to_string()),
            Self::Forbidden => (
                "forbidden",
                "You do not have access to this resource.".to_string(),
            ),
            Self::NotFound(msg) => ("not_found", msg.to_string()),
            Self::Conflict(msg) => ("conflict", msg.clone()),
            Self::Internal(_) => ("internal", GENERIC_MESSAGE.to_string()),
        };
        ErrorBody {
            code: code.to_string(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("internal error: {:#}", e);
        }
        (self.status(), Json(self.body())).into_response()
    }
}

/// Run blocking DB/hash work off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed"))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::Internal(anyhow::anyhow!("disk I/O error at /var/db"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.body();
        assert_eq!(body.code, "internal");
        assert_eq!(body.message, GENERIC_MESSAGE);
    }

    #[test]
    fn auth_codes_keep_their_wire_name() {
        let err = ApiError::Auth(AuthErrorCode::WrongPassword);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.body().code, "auth/wrong-password");
        assert_eq!(err.body().message, "Invalid email or password.");
        assert_eq!(
            ApiError::Auth(AuthErrorCode::TooManyRequests).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
