use axum_extra::extract::cookie::{Cookie, SameSite};
use shelf_kernel::Settings;
use time::Duration;

/// Cookie policy for the session token, fixed at startup.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    secure: bool,
    same_site: SameSite,
    max_age: Duration,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, production: bool, ttl_secs: u64) -> Self {
        Self {
            name: name.into(),
            secure: production,
            same_site: if production {
                SameSite::Strict
            } else {
                SameSite::Lax
            },
            max_age: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.auth.cookie_name.clone(),
            settings.environment.is_production(),
            settings.auth.token_ttl_secs,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie carrying `token`
    pub fn issue(&self, token: String) -> Cookie<'static> {
        self.build(token, self.max_age)
    }

    /// Expired cookie with the same attributes
    pub fn clear(&self) -> Cookie<'static> {
        self.build(String::new(), Duration::ZERO)
    }

    fn build(&self, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(max_age)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_policy_is_lax() {
        let cookie = SessionCookie::new("token", false, 86_400).issue("abc".into());

        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(86_400)));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn production_policy_is_strict_and_secure() {
        let session = SessionCookie::new("token", true, 60);
        let issued = session.issue("abc".into());
        let cleared = session.clear();

        for cookie in [&issued, &cleared] {
            assert_eq!(cookie.secure(), Some(true));
            assert_eq!(cookie.same_site(), Some(SameSite::Strict));
            assert_eq!(cookie.http_only(), Some(true));
        }
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn built_from_settings() {
        let settings = Settings::default();
        let session = SessionCookie::from_settings(&settings);
        assert_eq!(session.name(), settings.auth.cookie_name);
    }
}
