//! In-process harness for module tests: memory store, fake collaborators and
//! request builders driven through `tower::ServiceExt::oneshot`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

use shelf_authz::Role;
use shelf_db::{Collection, DocumentStore, Filter, MemoryStore};
use shelf_integrations::{Email, HostedImage, ImageHost, MailError, Mailer, MediaError, StagedFile};
use shelf_kernel::{InitCtx, Settings};

use crate::app::build_registry;
use crate::context::AppContext;
use crate::modules::books::models::Book;
use crate::modules::reviews::models::Review;
use crate::modules::{books, reviews, users};

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

pub struct FakeImageHost {
    fail: bool,
}

#[async_trait]
impl ImageHost for FakeImageHost {
    async fn upload(&self, file: &StagedFile) -> Result<HostedImage, MediaError> {
        if self.fail {
            return Err(MediaError::Rejected {
                status: 502,
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(HostedImage {
            secure_url: format!("https://images.test/{}", file.file_name()),
            public_id: file.file_name().to_string(),
        })
    }
}

pub struct TestApp {
    pub ctx: AppContext,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
    staging: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(false).await
    }

    pub async fn with_failing_images() -> Self {
        Self::build(true).await
    }

    async fn build(failing_images: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");

        let mut settings = Settings::default();
        settings.auth.bcrypt_cost = 4;
        settings.media.temp_dir = staging.to_string_lossy().into_owned();
        settings.server.public_dir = dir.path().to_string_lossy().into_owned();

        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let ctx = AppContext::new(
            &settings,
            store.clone(),
            Arc::new(FakeImageHost {
                fail: failing_images,
            }),
            mailer.clone(),
        );

        let registry = build_registry(&ctx);
        let init = InitCtx {
            settings: &settings,
            store: store.as_ref(),
        };
        registry.init_modules(&init).await.unwrap();
        registry.run_migrations(store.as_ref()).await.unwrap();
        let router = shelf_http::build_router(&registry, &settings).unwrap();

        Self {
            ctx,
            mailer,
            router,
            staging,
            _dir: dir,
        }
    }

    pub async fn call(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Register an account named Ada Lovelace and return its session token.
    pub async fn register(&self, email: &str, password: &str) -> String {
        let response = self
            .call(json_request(
                "POST",
                "/api/v1/users/register",
                serde_json::json!({
                    "email": email,
                    "firstName": "Ada",
                    "lastName": "Lovelace",
                    "password": password,
                }),
            ))
            .await;
        assert_eq!(response.status(), 201, "registration of {email} failed");
        body_json(response).await["data"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub async fn admin_token(&self) -> String {
        let token = self.register("admin@example.com", "Adm1n!pass").await;
        let admin = users::promote_to_admin(self.ctx.store.clone(), "admin@example.com")
            .await
            .unwrap();
        assert_eq!(self.user_id(&token), admin.id);
        self.ctx.tokens.issue(&admin.id, Role::Admin).unwrap()
    }

    pub fn user_id(&self, token: &str) -> String {
        self.ctx.tokens.verify(token).unwrap().sub
    }

    pub async fn seed_book(&self, title: &str, author: &str) -> String {
        let now = OffsetDateTime::now_utc();
        let book = Book {
            id: uuid::Uuid::now_v7().to_string(),
            title: title.to_string(),
            author: author.to_string(),
            genre: "Fiction".to_string(),
            description: format!("{title} by {author}"),
            published_year: 1965,
            image: Some("https://images.test/seed.jpg".to_string()),
            created_at: now,
            updated_at: now,
        };
        Collection::<Book>::new(self.ctx.store.clone(), books::COLLECTION)
            .insert(&book)
            .await
            .unwrap()
            .id
    }

    pub async fn seed_review(&self, book_id: &str, user_id: &str, rating: u8) -> String {
        let now = OffsetDateTime::now_utc();
        let review = Review {
            id: uuid::Uuid::now_v7().to_string(),
            user: user_id.to_string(),
            book: book_id.to_string(),
            rating,
            review_text: "Seeded".to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        Collection::<Review>::new(self.ctx.store.clone(), reviews::COLLECTION)
            .insert(&review)
            .await
            .unwrap()
            .id
    }

    pub async fn count(&self, collection: &str) -> u64 {
        self.ctx.store.count(collection, &Filter::all()).await.unwrap()
    }

    /// Uploads still parked in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(&self.staging)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn with_token(builder: axum::http::request::Builder, token: Option<&str>) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn json_request_with_token(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), Some(token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

/// `multipart/form-data` request with text `fields` and an optional
/// `(file name, contents)` image part.
pub fn multipart_request(
    method: &str,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    image: Option<(&str, &str)>,
) -> Request<Body> {
    const BOUNDARY: &str = "shelf-test-boundary";

    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((file_name, contents)) = image {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: image/jpeg\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    with_token(Request::builder().method(method).uri(uri), Some(token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
