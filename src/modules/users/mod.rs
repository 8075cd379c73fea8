pub mod handlers;
pub mod models;
pub mod validation;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use axum::{
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use time::OffsetDateTime;

use shelf_authz::Role;
use shelf_db::{Collection, DocumentStore, Filter, IndexSpec};
use shelf_kernel::{InitCtx, Migration, Module};

use crate::context::AppContext;
use models::{RoleChange, UserProfile, UserRecord};

pub const COLLECTION: &str = "users";

/// Accounts, sessions and password management
pub struct UsersModule {
    ctx: AppContext,
}

impl UsersModule {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for UsersModule {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            secure_cookie = ctx.settings.environment.is_production(),
            "users module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/register", post(handlers::register))
            .route("/login", post(handlers::login))
            .route("/logout", post(handlers::logout))
            .route("/forgot-password", post(handlers::forgot_password))
            .route("/reset-password", put(handlers::reset_password))
            .route("/user", get(handlers::current_user))
            .with_state(self.ctx.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
        });
        let session = json!({
            "description": "Session started; the token is also set as an HTTP-only cookie",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/SessionResponse" } } }
        });
        let message = json!({
            "description": "OK",
            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/MessageResponse" } } }
        });

        Some(json!({
            "paths": {
                "/register": {
                    "post": {
                        "summary": "Register a new account",
                        "tags": ["Users"],
                        "requestBody": { "required": true, "content": { "application/json": { "schema": { "$ref": "#/components/schemas/RegisterUser" } } } },
                        "responses": { "201": session, "400": error }
                    }
                },
                "/login": {
                    "post": {
                        "summary": "Log in with email and password",
                        "tags": ["Users"],
                        "requestBody": { "required": true, "content": { "application/json": { "schema": { "$ref": "#/components/schemas/LoginUser" } } } },
                        "responses": { "200": session, "400": error, "404": error }
                    }
                },
                "/logout": {
                    "post": {
                        "summary": "Clear the session cookie",
                        "tags": ["Users"],
                        "responses": { "200": message }
                    }
                },
                "/forgot-password": {
                    "post": {
                        "summary": "Email a freshly generated password",
                        "tags": ["Users"],
                        "requestBody": { "required": true, "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ForgotPassword" } } } },
                        "responses": { "200": message, "400": error, "404": error, "500": error }
                    }
                },
                "/reset-password": {
                    "put": {
                        "summary": "Change password using the current one",
                        "tags": ["Users"],
                        "requestBody": { "required": true, "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ResetPassword" } } } },
                        "responses": { "200": message, "400": error, "401": error, "404": error }
                    }
                },
                "/user": {
                    "get": {
                        "summary": "Current user profile",
                        "tags": ["Users"],
                        "security": [{ "cookieAuth": [] }, { "bearerAuth": [] }],
                        "responses": {
                            "200": {
                                "description": "Profile",
                                "content": { "application/json": { "schema": { "$ref": "#/components/schemas/UserProfileResponse" } } }
                            },
                            "401": error,
                            "404": error
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "UserProfile": {
                        "type": "object",
                        "properties": {
                            "_id": { "type": "string", "format": "uuid" },
                            "email": { "type": "string", "format": "email" },
                            "firstName": { "type": "string" },
                            "lastName": { "type": "string" },
                            "userType": { "type": "string", "enum": ["user", "admin"] },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["_id", "email", "firstName", "userType", "createdAt", "updatedAt"]
                    },
                    "UserProfileResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": { "$ref": "#/components/schemas/UserProfile" }
                        }
                    },
                    "SessionResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": {
                                "type": "object",
                                "properties": {
                                    "user": { "$ref": "#/components/schemas/UserProfile" },
                                    "token": { "type": "string" }
                                }
                            }
                        }
                    },
                    "MessageResponse": {
                        "type": "object",
                        "properties": {
                            "statusCode": { "type": "integer" },
                            "success": { "type": "boolean" },
                            "message": { "type": "string" },
                            "data": { "type": "null" }
                        }
                    },
                    "RegisterUser": {
                        "type": "object",
                        "properties": {
                            "email": { "type": "string", "format": "email" },
                            "firstName": { "type": "string", "minLength": 3, "maxLength": 20 },
                            "lastName": { "type": "string", "maxLength": 20 },
                            "password": { "type": "string", "minLength": 8 }
                        },
                        "required": ["email", "firstName", "password"]
                    },
                    "LoginUser": {
                        "type": "object",
                        "properties": {
                            "email": { "type": "string", "format": "email" },
                            "password": { "type": "string" }
                        },
                        "required": ["email", "password"]
                    },
                    "ForgotPassword": {
                        "type": "object",
                        "properties": { "email": { "type": "string", "format": "email" } },
                        "required": ["email"]
                    },
                    "ResetPassword": {
                        "type": "object",
                        "properties": {
                            "email": { "type": "string", "format": "email" },
                            "oldPassword": { "type": "string" },
                            "newPassword": { "type": "string", "minLength": 8 }
                        },
                        "required": ["email", "oldPassword", "newPassword"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_email_unique",
            indexes: vec![IndexSpec::unique(COLLECTION, "users_email_unique", "email")],
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "users module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "users module stopped");
        Ok(())
    }
}

/// Create a new instance of the users module
pub fn create_module(ctx: AppContext) -> Arc<dyn Module> {
    Arc::new(UsersModule::new(ctx))
}

/// Grant the admin role to the account registered under `email`.
pub async fn promote_to_admin(
    store: Arc<dyn DocumentStore>,
    email: &str,
) -> anyhow::Result<UserProfile> {
    let email = validation::normalize_email(email)
        .ok_or_else(|| anyhow!("'{email}' is not a valid email address"))?;
    let change = RoleChange {
        user_type: Role::Admin,
        updated_at: OffsetDateTime::now_utc(),
    };
    let user = Collection::<UserRecord>::new(store, COLLECTION)
        .update_one(&Filter::eq("email", email.as_str()), &change)
        .await
        .context("failed to update user role")?
        .ok_or_else(|| anyhow!("no user registered with email '{email}'"))?;

    tracing::info!(user_id = %user.id, "user promoted to admin");
    Ok(user.into())
}
