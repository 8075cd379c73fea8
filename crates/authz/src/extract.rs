//! Request guards.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use shelf_http::AppError;

use crate::{AuthError, Role, SessionCookie, TokenService};

/// Caller identity taken from the session cookie or a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::AdminOnly)
        }
    }

    /// Fails with `message` unless the caller is `owner_id`.
    pub fn ensure_owner(&self, owner_id: &str, message: &'static str) -> Result<(), AuthError> {
        if self.id == owner_id {
            Ok(())
        } else {
            Err(AuthError::NotOwner(message))
        }
    }
}

/// Cookie first, then `Authorization: Bearer`.
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for AuthUser
where
    TokenService: FromRef<S>,
    SessionCookie: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionCookie::from_ref(state);
        let token = session_token(&parts.headers, session.name()).ok_or(AuthError::MissingToken)?;

        let claims = TokenService::from_ref(state).verify(&token).map_err(|err| {
            tracing::debug!(error = ?err, "rejected session token");
            err
        })?;

        Ok(AuthUser {
            id: claims.sub,
            role: claims.user_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::COOKIE, Request},
    };

    #[derive(Clone)]
    struct State {
        tokens: TokenService,
        session: SessionCookie,
    }

    impl FromRef<State> for TokenService {
        fn from_ref(state: &State) -> Self {
            state.tokens.clone()
        }
    }

    impl FromRef<State> for SessionCookie {
        fn from_ref(state: &State) -> Self {
            state.session.clone()
        }
    }

    fn state() -> State {
        State {
            tokens: TokenService::new("extractor-test-secret", 600),
            session: SessionCookie::new("token", false, 600),
        }
    }

    async fn extract(state: &State, request: Request<Body>) -> Result<AuthUser, AppError> {
        let (mut parts, _) = request.into_parts();
        AuthUser::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn reads_cookie() {
        let state = state();
        let token = state.tokens.issue("u1", Role::Admin).unwrap();
        let request = Request::get("/")
            .header(COOKIE, format!("theme=dark; token={token}"))
            .body(Body::empty())
            .unwrap();

        let user = extract(&state, request).await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn falls_back_to_bearer_header() {
        let state = state();
        let token = state.tokens.issue("u2", Role::User).unwrap();
        let request = Request::get("/")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let user = extract(&state, request).await.unwrap();
        assert_eq!(user.id, "u2");
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let state = state();
        let missing = extract(&state, Request::get("/").body(Body::empty()).unwrap()).await;
        assert!(matches!(missing, Err(AppError::Unauthorized { .. })));

        let bad = Request::get("/")
            .header(COOKIE, "token=forged")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(
            extract(&state, bad).await,
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[test]
    fn guards() {
        let user = AuthUser {
            id: "u1".into(),
            role: Role::User,
        };
        assert!(matches!(user.require_admin(), Err(AuthError::AdminOnly)));
        assert!(user.ensure_owner("u1", "nope").is_ok());
        assert!(matches!(
            user.ensure_owner("u2", "nope"),
            Err(AuthError::NotOwner("nope"))
        ));
    }
}
