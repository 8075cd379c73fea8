use anyhow::Context;
use axum::extract::State;
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;
use uuid::Uuid;

use shelf_authz::{AuthUser, Role};
use shelf_db::{Collection, Filter, StoreError};
use shelf_http::{ApiResponse, AppError, JsonBody};
use shelf_integrations::Email;

use super::models::{
    ForgotPassword, LoginUser, PasswordChange, RegisterUser, ResetPassword, SessionPayload,
    UserProfile, UserRecord,
};
use super::{validation, COLLECTION};
use crate::context::AppContext;
use crate::utils::password::{random_password, GENERATED_PASSWORD_LEN};

const EMAIL_IN_USE: &str = "Email is already in use.";

fn users(ctx: &AppContext) -> Collection<UserRecord> {
    Collection::new(ctx.store.clone(), COLLECTION)
}

async fn find_by_email(ctx: &AppContext, email: &str) -> Result<Option<UserRecord>, AppError> {
    let user = users(ctx)
        .find_one(&Filter::eq("email", email))
        .await
        .context("failed to look up user by email")?;
    Ok(user)
}

async fn set_password(ctx: &AppContext, user_id: &str, password: &str) -> Result<(), AppError> {
    let change = PasswordChange {
        password: ctx.passwords.hash(password).await?,
        updated_at: OffsetDateTime::now_utc(),
    };
    users(ctx)
        .update_one(&Filter::id(user_id), &change)
        .await
        .context("failed to store new password")?
        .ok_or_else(|| AppError::not_found("User not found."))?;
    Ok(())
}

fn start_session(
    ctx: &AppContext,
    jar: CookieJar,
    user: UserRecord,
) -> Result<(CookieJar, SessionPayload), AppError> {
    let token = ctx.tokens.issue(&user.id, user.user_type)?;
    let jar = jar.add(ctx.session.issue(token.clone()));
    Ok((
        jar,
        SessionPayload {
            user: user.into(),
            token,
        },
    ))
}

pub async fn register(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    JsonBody(input): JsonBody<RegisterUser>,
) -> Result<(CookieJar, ApiResponse<SessionPayload>), AppError> {
    let input = validation::registration(input)?;

    if find_by_email(&ctx, &input.email).await?.is_some() {
        return Err(AppError::conflict(vec![], EMAIL_IN_USE));
    }

    let now = OffsetDateTime::now_utc();
    let record = UserRecord {
        id: Uuid::now_v7().to_string(),
        email: input.email,
        first_name: input.first_name,
        last_name: input.last_name,
        password: ctx.passwords.hash(&input.password).await?,
        user_type: Role::User,
        created_at: now,
        updated_at: now,
    };

    // The unique index catches registrations racing past the lookup above.
    let user = match users(&ctx).insert(&record).await {
        Ok(user) => user,
        Err(err @ StoreError::Duplicate { .. }) => {
            tracing::info!(error = %err, "registration lost a race on email");
            return Err(AppError::conflict(vec![], EMAIL_IN_USE));
        }
        Err(err) => return Err(anyhow::Error::new(err).context("failed to create user").into()),
    };

    tracing::info!(user_id = %user.id, "user registered");
    let (jar, payload) = start_session(&ctx, jar, user)?;
    Ok((jar, ApiResponse::created("User registered successfully", payload)))
}

pub async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    JsonBody(input): JsonBody<LoginUser>,
) -> Result<(CookieJar, ApiResponse<SessionPayload>), AppError> {
    let (email, password) = validation::login(input)?;

    let user = find_by_email(&ctx, &email)
        .await?
        .ok_or_else(|| AppError::not_found("User does not exist."))?;

    if !ctx.passwords.verify(&password, &user.password).await? {
        return Err(AppError::bad_request("Invalid password."));
    }

    let (jar, payload) = start_session(&ctx, jar, user)?;
    Ok((jar, ApiResponse::ok("User logged in successfully", payload)))
}

pub async fn logout(
    State(ctx): State<AppContext>,
    jar: CookieJar,
) -> (CookieJar, ApiResponse<()>) {
    (
        jar.add(ctx.session.clear()),
        ApiResponse::message("User logged out successfully"),
    )
}

pub async fn forgot_password(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    JsonBody(input): JsonBody<ForgotPassword>,
) -> Result<(CookieJar, ApiResponse<()>), AppError> {
    let email = validation::forgot_password(input)?;

    let user = find_by_email(&ctx, &email)
        .await?
        .ok_or_else(|| AppError::not_found("User with this email does not exist."))?;

    let password = random_password(GENERATED_PASSWORD_LEN);
    set_password(&ctx, &user.id, &password).await?;

    ctx.mailer
        .send(&Email {
            to: user.email.clone(),
            subject: "Password Reset".to_string(),
            text: format!(
                "Your new password is: {password}\nPlease change your password after logging in."
            ),
        })
        .await
        .context("failed to send password reset email")?;

    tracing::info!(user_id = %user.id, "password reset by email");
    Ok((
        jar.add(ctx.session.clear()),
        ApiResponse::message("Password reset email sent successfully"),
    ))
}

pub async fn reset_password(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    JsonBody(input): JsonBody<ResetPassword>,
) -> Result<(CookieJar, ApiResponse<()>), AppError> {
    let input = validation::reset_password(input)?;

    let user = find_by_email(&ctx, &input.email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))?;

    if !ctx.passwords.verify(&input.old_password, &user.password).await? {
        return Err(AppError::unauthorized("Invalid old password."));
    }

    set_password(&ctx, &user.id, &input.new_password).await?;

    Ok((
        jar.add(ctx.session.clear()),
        ApiResponse::message("Password reset successfully."),
    ))
}

pub async fn current_user(
    State(ctx): State<AppContext>,
    auth: AuthUser,
) -> Result<ApiResponse<UserProfile>, AppError> {
    let user = users(&ctx)
        .find_by_id(&auth.id)
        .await
        .context("failed to load current user")?
        .ok_or_else(|| AppError::not_found("User not found."))?;

    Ok(ApiResponse::ok("User fetched successfully.", user.into()))
}
