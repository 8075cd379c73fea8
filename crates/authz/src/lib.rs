//! Authentication and authorization for shelf: password hashing, signed
//! session tokens, the session cookie policy, and the request guards built on
//! top of them.

use serde::{Deserialize, Serialize};
use shelf_http::AppError;
use thiserror::Error;

pub mod extract;
pub mod password;
pub mod session;
pub mod token;

pub use extract::AuthUser;
pub use password::PasswordHasher;
pub use session::SessionCookie;
pub use token::{Claims, TokenService};

/// Account type carried in every token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized: No token provided")]
    MissingToken,

    #[error("Unauthorized: Invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Access denied. Admins only.")]
    AdminOnly,

    #[error("{0}")]
    NotOwner(&'static str),

    #[error("failed to sign session token")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("password hashing failed")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed: {0}")]
    Blocking(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken(_) => {
                AppError::unauthorized(err.to_string())
            }
            AuthError::AdminOnly | AuthError::NotOwner(_) => AppError::forbidden(err.to_string()),
            AuthError::Signing(_) | AuthError::Hash(_) | AuthError::Blocking(_) => {
                AppError::Internal(anyhow::Error::new(err))
            }
        }
    }
}
