//! Outbound collaborators: the image host that stores book covers and the
//! mailer that delivers password-reset messages.

use std::{sync::Arc, time::Duration};

use shelf_kernel::settings::{MailProvider, MailSettings, MediaProvider, MediaSettings};

pub mod mail;
pub mod media;

pub use mail::{Email, LogMailer, MailError, Mailer, SendGridMailer};
pub use media::{CloudinaryHost, HostedImage, ImageHost, LocalImageHost, MediaError, StagedFile};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("shelf/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Image host selected by `media.provider`
pub fn image_host(settings: &MediaSettings) -> Result<Arc<dyn ImageHost>, MediaError> {
    match settings.provider {
        MediaProvider::Local => {
            tracing::info!(dir = %settings.local_dir, "storing uploaded images on local disk");
            Ok(Arc::new(LocalImageHost::new(
                &settings.local_dir,
                &settings.public_base_url,
            )))
        }
        MediaProvider::Cloudinary => {
            let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
                settings.cloud_name.as_deref(),
                settings.api_key.as_deref(),
                settings.api_secret.as_deref(),
            ) else {
                return Err(MediaError::Config(
                    "cloudinary needs cloud_name, api_key and api_secret".to_string(),
                ));
            };
            Ok(Arc::new(CloudinaryHost::new(
                http_client()?,
                cloud_name,
                api_key,
                api_secret,
                settings.signature_algorithm,
            )))
        }
    }
}

/// Mailer selected by `mail.provider`
pub fn mailer(settings: &MailSettings) -> Result<Arc<dyn Mailer>, MailError> {
    match settings.provider {
        MailProvider::Log => Ok(Arc::new(LogMailer)),
        MailProvider::Sendgrid => {
            let api_key = settings
                .api_key
                .as_deref()
                .ok_or_else(|| MailError::Config("sendgrid needs mail.api_key".to_string()))?;
            Ok(Arc::new(SendGridMailer::new(
                http_client()?,
                api_key,
                &settings.from_email,
            )))
        }
    }
}
