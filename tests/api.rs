//! End-to-end walk through the public API against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use shelf_app::modules::{reviews, users};
use shelf_app::{build_registry, AppContext};
use shelf_db::{DocumentStore, Filter, MemoryStore};
use shelf_integrations::{Email, HostedImage, ImageHost, MailError, Mailer, MediaError, StagedFile};
use shelf_kernel::{InitCtx, Settings};

const PASSWORD: &str = "Passw0rd!";
const BOUNDARY: &str = "api-test-boundary";

struct EchoImages;

#[async_trait]
impl ImageHost for EchoImages {
    async fn upload(&self, file: &StagedFile) -> Result<HostedImage, MediaError> {
        Ok(HostedImage {
            secure_url: format!("https://cdn.test/{}", file.file_name()),
            public_id: file.file_name().to_string(),
        })
    }
}

struct SilentMailer;

#[async_trait]
impl Mailer for SilentMailer {
    async fn send(&self, _email: &Email) -> Result<(), MailError> {
        Ok(())
    }
}

struct Api {
    router: Router,
    store: Arc<dyn DocumentStore>,
    _staging: tempfile::TempDir,
}

impl Api {
    async fn start() -> Self {
        let staging = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.auth.bcrypt_cost = 4;
        settings.media.temp_dir = staging.path().to_string_lossy().into_owned();

        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let ctx = AppContext::new(&settings, store.clone(), Arc::new(EchoImages), Arc::new(SilentMailer));
        let registry = build_registry(&ctx);
        let init = InitCtx {
            settings: &settings,
            store: store.as_ref(),
        };
        registry.init_modules(&init).await.unwrap();
        registry.run_migrations(store.as_ref()).await.unwrap();

        Self {
            router: shelf_http::build_router(&registry, &settings).unwrap(),
            store,
            _staging: staging,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response<Body> = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn register(&self, email: &str) -> (StatusCode, Value) {
        self.json(
            "POST",
            "/api/v1/users/register",
            None,
            json!({ "email": email, "firstName": "Test", "lastName": "Reader", "password": PASSWORD }),
        )
        .await
    }

    async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/v1/users/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn count(&self, collection: &str) -> u64 {
        self.store.count(collection, &Filter::all()).await.unwrap()
    }
}

fn book_form(token: &str) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in [
        ("title", "Dune"),
        ("author", "Frank Herbert"),
        ("genre", "Science Fiction"),
        ("description", "Spice, sandworms and succession."),
        ("publishedYear", "1965"),
    ] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"dune.png\"\r\nContent-Type: image/png\r\n\r\npng-bytes\r\n--{BOUNDARY}--\r\n"
    ));

    Request::post("/api/v1/books/book")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn catalogue_and_reviews_flow() {
    let api = Api::start().await;

    assert_eq!(api.register("admin@example.com").await.0, StatusCode::CREATED);
    users::promote_to_admin(api.store.clone(), "admin@example.com")
        .await
        .unwrap();
    let admin = api.login("admin@example.com").await;

    let (status, created) = api.send(book_form(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["publishedYear"], 1965);
    assert!(created["data"]["image"].as_str().unwrap().starts_with("https://cdn.test/"));
    let book_id = created["data"]["_id"].as_str().unwrap().to_string();

    let (_, first) = api.register("u@example.com").await;
    let reader_u = first["data"]["token"].as_str().unwrap().to_string();
    let (_, second) = api.register("v@example.com").await;
    let reader_v = second["data"]["token"].as_str().unwrap().to_string();

    let (status, listing) = api.get("/api/v1/books?search=dune", &reader_u).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["data"]["totalBooks"], 1);
    assert_eq!(listing["data"]["books"][0]["averageRating"], "N/A");

    let (status, review_u) = api
        .json(
            "POST",
            "/api/v1/reviews/review",
            Some(&reader_u),
            json!({ "bookId": book_id, "reviewText": "A masterpiece", "rating": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, listing) = api.get("/api/v1/books?search=dune", &reader_u).await;
    assert_eq!(listing["data"]["books"][0]["averageRating"], json!(5));

    let (status, _) = api
        .json(
            "POST",
            "/api/v1/reviews/review",
            Some(&reader_v),
            json!({ "bookId": book_id, "reviewText": "Slow start", "rating": "3" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, listing) = api.get("/api/v1/books?search=DUNE", &reader_v).await;
    assert_eq!(listing["data"]["books"][0]["averageRating"], json!(4));

    let review_uri = format!(
        "/api/v1/reviews/review/{}",
        review_u["data"]["_id"].as_str().unwrap()
    );
    let (status, _) = api
        .json("PUT", &review_uri, Some(&reader_v), json!({ "rating": 1 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reviews) = api
        .get(&format!("/api/v1/reviews/book/{book_id}"), &reader_v)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviews["data"]["total"], 2);
    assert_eq!(reviews["data"]["reviews"][0]["rating"], 5);
}

#[tokio::test]
async fn duplicate_registration_keeps_one_account() {
    let api = Api::start().await;

    assert_eq!(api.register("dup@example.com").await.0, StatusCode::CREATED);
    let (status, body) = api.register("DUP@example.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(api.count(users::COLLECTION).await, 1);
}

#[tokio::test]
async fn review_of_missing_book_is_rejected() {
    let api = Api::start().await;
    let (_, registered) = api.register("u@example.com").await;
    let token = registered["data"]["token"].as_str().unwrap();

    let (status, body) = api
        .json(
            "POST",
            "/api/v1/reviews/review",
            Some(token),
            json!({ "bookId": uuid::Uuid::now_v7(), "reviewText": "Ghost book", "rating": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Book does not exist.");
    assert_eq!(api.count(reviews::COLLECTION).await, 0);
}

#[tokio::test]
async fn unknown_routes_use_the_error_envelope() {
    let api = Api::start().await;
    let (status, body) = api
        .send(Request::get("/api/v1/nowhere").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
    assert_eq!(body["statusCode"], 404);
}
