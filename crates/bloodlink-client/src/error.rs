use bloodlink_types::auth_error::{GENERIC_MESSAGE, user_message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error body.
    #[error("{code} ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway: {0}")]
    Gateway(String),

    #[error("not logged in")]
    NotLoggedIn,
}

impl ClientError {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Text fit to show the user. `auth/*` codes go through the fixed table;
    /// validation and conflict messages are shown as the server wrote them.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { code, .. } if code.starts_with("auth/") => user_message(code).to_string(),
            Self::Api { code, message, .. }
                if !message.is_empty() && code != "internal" =>
            {
                message.clone()
            }
            Self::NotLoggedIn => "Please sign in again.".to_string(),
            _ => GENERIC_MESSAGE.to_string(),
        }
    }
}
