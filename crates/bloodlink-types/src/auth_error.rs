use serde::{Deserialize, Serialize};

/// Fallback shown for any failure without a specific message.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

/// Authentication failure codes returned by `/auth/*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthErrorCode {
    #[serde(rename = "auth/invalid-email")]
    InvalidEmail,
    #[serde(rename = "auth/weak-password")]
    WeakPassword,
    #[serde(rename = "auth/email-already-in-use")]
    EmailAlreadyInUse,
    #[serde(rename = "auth/user-not-found")]
    UserNotFound,
    #[serde(rename = "auth/wrong-password")]
    WrongPassword,
    #[serde(rename = "auth/too-many-requests")]
    TooManyRequests,
}

impl AuthErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEmail => "auth/invalid-email",
            Self::WeakPassword => "auth/weak-password",
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::TooManyRequests => "auth/too-many-requests",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidEmail => "Invalid email address format.",
            Self::WeakPassword => "Password should be at least 6 characters.",
            Self::EmailAlreadyInUse => "An account with this email already exists.",
            Self::UserNotFound | Self::WrongPassword => "Invalid email or password.",
            Self::TooManyRequests => "Too many attempts. Try again later or reset your password.",
        }
    }
}

/// Map any error code to the string shown to the user. Codes outside the
/// auth table fall back to [`GENERIC_MESSAGE`].
pub fn user_message(code: &str) -> &'static str {
    match serde_json::from_value::<AuthErrorCode>(serde_json::Value::String(code.to_string())) {
        Ok(known) => known.user_message(),
        Err(_) => GENERIC_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_fixed_strings() {
        assert_eq!(user_message("auth/invalid-email"), "Invalid email address format.");
        assert_eq!(user_message("auth/user-not-found"), user_message("auth/wrong-password"));
        assert_eq!(
            user_message(AuthErrorCode::TooManyRequests.as_str()),
            "Too many attempts. Try again later or reset your password."
        );
    }

    #[test]
    fn unmapped_codes_fall_back() {
        assert_eq!(user_message("auth/operation-not-allowed"), GENERIC_MESSAGE);
        assert_eq!(user_message("not_found"), GENERIC_MESSAGE);
        assert_eq!(user_message(""), GENERIC_MESSAGE);
    }

    #[test]
    fn serde_name_matches_as_str() {
        for code in [
            AuthErrorCode::InvalidEmail,
            AuthErrorCode::WeakPassword,
            AuthErrorCode::EmailAlreadyInUse,
            AuthErrorCode::UserNotFound,
            AuthErrorCode::WrongPassword,
            AuthErrorCode::TooManyRequests,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
