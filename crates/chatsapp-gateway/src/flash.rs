//! One-shot notices shown on the next page view.

use serde::Serialize;

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

/// A message rendered once, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

/// Outcomes of the account forms.
///
/// Before login there is no session to carry a flash, so the notice travels
/// as a short code in a cookie and is turned back into text on the next view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Registered,
    UsernameTaken,
    RegistrationFailed,
    AccountNotFound,
    WrongCredentials,
    LoginFailed,
    LoggedIn,
    LoggedOut,
    Unavailable,
}

impl Notice {
    const ALL: [Notice; 9] = [
        Notice::Registered,
        Notice::UsernameTaken,
        Notice::RegistrationFailed,
        Notice::AccountNotFound,
        Notice::WrongCredentials,
        Notice::LoginFailed,
        Notice::LoggedIn,
        Notice::LoggedOut,
        Notice::Unavailable,
    ];

    /// Cookie-safe code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::UsernameTaken => "username-taken",
            Self::RegistrationFailed => "registration-failed",
            Self::AccountNotFound => "account-not-found",
            Self::WrongCredentials => "wrong-credentials",
            Self::LoginFailed => "login-failed",
            Self::LoggedIn => "logged-in",
            Self::LoggedOut => "logged-out",
            Self::Unavailable => "unavailable",
        }
    }

    /// Parse a code. Unknown codes are ignored.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|n| n.code() == code)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Registered => "Registration successful!",
            Self::UsernameTaken => "Username is already taken.",
            Self::RegistrationFailed => "Registration failed. Please try again.",
            Self::AccountNotFound => "Account not found.",
            Self::WrongCredentials => "Wrong username or password.",
            Self::LoginFailed => "Login failed. Please try again.",
            Self::LoggedIn => "Login successful!",
            Self::LoggedOut => "You have been logged out.",
            Self::Unavailable => "Service temporarily unavailable. Please try again later.",
        }
    }

    pub fn level(&self) -> FlashLevel {
        match self {
            Self::Registered | Self::LoggedIn | Self::LoggedOut => FlashLevel::Success,
            _ => FlashLevel::Error,
        }
    }

    pub fn flash(&self) -> Flash {
        Flash {
            level: self.level(),
            message: self.message().to_string(),
        }
    }
}
