//! Shared, immutable state handed to every module router.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;

use shelf_authz::{PasswordHasher, SessionCookie, TokenService};
use shelf_db::DocumentStore;
use shelf_integrations::{ImageHost, Mailer};
use shelf_kernel::settings::{ListingSettings, MediaSettings};
use shelf_kernel::Settings;

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn DocumentStore>,
    pub tokens: TokenService,
    pub passwords: PasswordHasher,
    pub session: SessionCookie,
    pub images: Arc<dyn ImageHost>,
    pub mailer: Arc<dyn Mailer>,
    pub listing: ListingSettings,
    pub media: Arc<MediaSettings>,
}

impl AppContext {
    /// Context with explicit collaborators.
    pub fn new(
        settings: &Settings,
        store: Arc<dyn DocumentStore>,
        images: Arc<dyn ImageHost>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            tokens: TokenService::new(&settings.auth.token_secret, settings.auth.token_ttl_secs),
            passwords: PasswordHasher::new(settings.auth.bcrypt_cost),
            session: SessionCookie::from_settings(settings),
            images,
            mailer,
            listing: settings.listing,
            media: Arc::new(settings.media.clone()),
        }
    }

    /// Context with the collaborators selected by `settings`.
    pub fn from_settings(settings: &Settings, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let images = shelf_integrations::image_host(&settings.media)
            .context("failed to configure image host")?;
        let mailer = shelf_integrations::mailer(&settings.mail).context("failed to configure mailer")?;
        Ok(Self::new(settings, store, images, mailer))
    }
}

impl FromRef<AppContext> for TokenService {
    fn from_ref(ctx: &AppContext) -> Self {
        ctx.tokens.clone()
    }
}

impl FromRef<AppContext> for SessionCookie {
    fn from_ref(ctx: &AppContext) -> Self {
        ctx.session.clone()
    }
}
