pub mod form;
pub mod handlers;
pub mod listing;
pub mod models;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde_json::json;

use shelf_kernel::{InitCtx, Module};

use crate::context::AppContext;

pub const COLLECTION: &str = "books";

/// Room for the text fields around the image in a multipart body.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Book catalog with rating-aware listing
pub struct BooksModule {
    ctx: AppContext,
}

impl BooksModule {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&ctx.settings.media.temp_dir)
            .await
            .with_context(|| format!("cannot create upload staging dir {}", ctx.settings.media.temp_dir))?;
        tracing::info!(
            module = self.name(),
            provider = ?ctx.settings.media.provider,
            default_limit = ctx.settings.listing.default_limit,
            max_limit = ctx.settings.listing.max_limit,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(handlers::list_books))
            .route("/book", post(handlers::add_book))
            .route(
                "/book/{id}",
                get(handlers::get_book)
                    .put(handlers::edit_book)
                    .delete(handlers::delete_book),
            )
            .layer(DefaultBodyLimit::max(
                self.ctx.media.max_upload_bytes + FORM_OVERHEAD_BYTES,
            ))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
        });
        let book = json!({
            "description": "Book",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/BookResponse" } } }
        });
        let id_param = json!({
            "name": "id", "in": "path", "required": true,
            "schema": { "type": "string", "format": "uuid" }
        });
        let security = json!([{ "cookieAuth": [] }, { "bearerAuth": [] }]);

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books with their average rating",
                        "tags": ["Books"],
                        "security": security,
                        "parameters": [
                            { "name": "limit", "in": "query", "schema": { "type": "integer", "minimum": 1 } },
                            { "name": "offset", "in": "query", "schema": { "type": "integer", "minimum": 0 } },
                            { "name": "search", "in": "query", "description": "Case-insensitive substring of title or author", "schema": { "type": "string" } }
                        ],
                        "responses": {
                            "200": {
                                "description": "One page of books",
                                "content": { "application/json": { "schema": { "$ref": "#/components/schemas/BookPageResponse" } } }
                            },
                            "401": error
                        }
                    }
                },
                "/book": {
                    "post": {
                        "summary": "Add a book (admin)",
                        "tags": ["Books"],
                        "security": security,
                        "requestBody": {
                            "required": true,
                            "content": { "multipart/form-data": { "schema": { "$ref": "#/components/schemas/BookForm" } } }
                        },
                        "responses": { "201": book, "400": error, "401": error, "403": error, "500": error }
                    }
                },
                "/book/{id}": {
                    "get": {
                        "summary": "Fetch a book",
                        "tags": ["Books"],
                        "security": security,
                        "parameters": [id_param],
                        "responses": { "200": book, "400": error, "401": error, "404": error }
                    },
                    "put": {
                        "summary": "Edit a book (admin); omitted fields are kept",
                        "tags": ["Books"],
                        "security": security,
                        "parameters": [id_param],
                        "requestBody": {
                            "required": true,
                            "content": { "multipart/form-data": { "schema": { "$ref": "#/components/schemas/BookForm" } } }
                        },
                        "responses": { "200": book, "400": error, "401": error, "403": error, "404": error, "500": error }
                    },
                    "delete": {
                        "summary": "Delete a book and its reviews (admin)",
                        "tags": ["Books"],
                        "security": security,
                        "parameters": [id_param],
                        "responses": { "200": book, "400": error, "401": error, "403": error, "404": error }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "_id": { "type": "string", "format": "uuid" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "genre": { "type": "string" },
                            "description": { "type": "string" },
                            "publishedYear": { "type": "integer", "minimum": 0 },
                            "image": { "type": "string", "format": "uri" },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["_id", "title", "author", "genre", "description", "publishedYear"]
                    },
                    "BookResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": { "$ref": "#/components/schemas/Book" }
                        }
                    },
                    "BookListing": {
                        "type": "object",
                        "properties": {
                            "_id": { "type": "string", "format": "uuid" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "genre": { "type": "string" },
                            "description": { "type": "string" },
                            "publishedYear": { "type": "integer" },
                            "image": { "type": "string" },
                            "averageRating": { "oneOf": [{ "type": "number" }, { "type": "string", "enum": ["N/A"] }] }
                        }
                    },
                    "BookPageResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": {
                                "type": "object",
                                "properties": {
                                    "books": { "type": "array", "items": { "$ref": "#/components/schemas/BookListing" } },
                                    "totalBooks": { "type": "integer" },
                                    "limit": { "type": "integer" },
                                    "offset": { "type": "integer" }
                                }
                            }
                        }
                    },
                    "BookForm": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "genre": { "type": "string" },
                            "description": { "type": "string" },
                            "publishedYear": { "type": "integer", "minimum": 0 },
                            "image": { "type": "string", "format": "binary" }
                        }
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(ctx: AppContext) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(ctx))
}
