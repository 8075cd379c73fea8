pub mod handlers;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};
use serde_json::json;

use shelf_db::IndexSpec;
use shelf_kernel::{InitCtx, Migration, Module};

use crate::context::AppContext;

pub const COLLECTION: &str = "reviews";

/// Ratings and review text, owned by their authors
pub struct ReviewsModule {
    ctx: AppContext,
}

impl ReviewsModule {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for ReviewsModule {
    fn name(&self) -> &'static str {
        "reviews"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/review", post(handlers::add_review))
            .route(
                "/review/{review_id}",
                get(handlers::get_review)
                    .put(handlers::edit_review)
                    .delete(handlers::delete_review),
            )
            .route("/book/{book_id}", get(handlers::book_reviews))
            .route("/user/{user_id}", get(handlers::user_reviews))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
        });
        let review = json!({
            "description": "Review",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ReviewResponse" } } }
        });
        let page = json!({
            "description": "One page of reviews",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ReviewPageResponse" } } }
        });
        let window = json!([
            { "name": "limit", "in": "query", "schema": { "type": "integer", "minimum": 1 } },
            { "name": "offset", "in": "query", "schema": { "type": "integer", "minimum": 0 } }
        ]);
        let path_id = |name: &str| {
            json!({ "name": name, "in": "path", "required": true, "schema": { "type": "string", "format": "uuid" } })
        };
        let security = json!([{ "cookieAuth": [] }, { "bearerAuth": [] }]);

        Some(json!({
            "paths": {
                "/review": {
                    "post": {
                        "summary": "Review a book",
                        "tags": ["Reviews"],
                        "security": security,
                        "requestBody": { "required": true, "content": { "application/json": { "schema": { "$ref": "#/components/schemas/NewReview" } } } },
                        "responses": { "201": review, "400": error, "401": error }
                    }
                },
                "/review/{reviewId}": {
                    "get": {
                        "summary": "Fetch a review with its book's title and author",
                        "tags": ["Reviews"],
                        "security": security,
                        "parameters": [path_id("reviewId")],
                        "responses": { "200": review, "400": error, "401": error, "404": error }
                    },
                    "put": {
                        "summary": "Edit your review",
                        "tags": ["Reviews"],
                        "security": security,
                        "parameters": [path_id("reviewId")],
                        "requestBody": { "required": true, "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ReviewChanges" } } } },
                        "responses": { "200": review, "400": error, "401": error, "403": error, "404": error }
                    },
                    "delete": {
                        "summary": "Delete your review",
                        "tags": ["Reviews"],
                        "security": security,
                        "parameters": [path_id("reviewId")],
                        "responses": { "200": { "description": "Deleted" }, "401": error, "403": error, "404": error }
                    }
                },
                "/book/{bookId}": {
                    "get": {
                        "summary": "Reviews of a book with author names",
                        "tags": ["Reviews"],
                        "security": security,
                        "parameters": [path_id("bookId"), window[0], window[1]],
                        "responses": { "200": page, "400": error, "401": error }
                    }
                },
                "/user/{userId}": {
                    "get": {
                        "summary": "Reviews written by a user with book titles",
                        "tags": ["Reviews"],
                        "security": security,
                        "parameters": [path_id("userId"), window[0], window[1]],
                        "responses": { "200": page, "400": error, "401": error }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Review": {
                        "type": "object",
                        "properties": {
                            "_id": { "type": "string", "format": "uuid" },
                            "user": {},
                            "book": {},
                            "rating": { "type": "integer", "minimum": 1, "maximum": 5 },
                            "reviewText": { "type": "string" },
                            "version": { "type": "integer", "minimum": 1 },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        }
                    },
                    "ReviewResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": { "$ref": "#/components/schemas/Review" }
                        }
                    },
                    "ReviewPageResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": {
                                "type": "object",
                                "properties": {
                                    "total": { "type": "integer" },
                                    "reviews": { "type": "array", "items": { "$ref": "#/components/schemas/Review" } }
                                }
                            }
                        }
                    },
                    "NewReview": {
                        "type": "object",
                        "properties": {
                            "bookId": { "type": "string", "format": "uuid" },
                            "reviewText": { "type": "string", "minLength": 1 },
                            "rating": { "type": "integer", "minimum": 1, "maximum": 5 }
                        },
                        "required": ["bookId", "reviewText", "rating"]
                    },
                    "ReviewChanges": {
                        "type": "object",
                        "properties": {
                            "reviewText": { "type": "string", "minLength": 1 },
                            "rating": { "type": "integer", "minimum": 1, "maximum": 5 },
                            "version": { "type": "integer", "description": "Version last read; stale versions are rejected" }
                        }
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_reference_indexes",
            indexes: vec![
                IndexSpec::lookup(COLLECTION, "reviews_book", "book"),
                IndexSpec::lookup(COLLECTION, "reviews_user", "user"),
            ],
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "reviews module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "reviews module stopped");
        Ok(())
    }
}

/// Create a new instance of the reviews module
pub fn create_module(ctx: AppContext) -> Arc<dyn Module> {
    Arc::new(ReviewsModule::new(ctx))
}
