use std::collections::HashMap;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use uuid::Uuid;

use shelf_authz::AuthUser;
use shelf_db::{Collection, Document, Filter, FindQuery, SortOrder, ID_FIELD};
use shelf_http::{decode_json, ApiResponse, AppError, FieldErrors, JsonBody, QueryParams};

use super::models::{NewReview, Review, ReviewChanges, ReviewPage, ReviewPatch, ReviewView};
use super::COLLECTION;
use crate::context::AppContext;
use crate::modules::books::models::{BookSummary, BookTitle};
use crate::modules::users::models::UserSummary;
use crate::modules::{books, users};
use crate::utils::validation::{is_valid_id, non_blank, rating};
use crate::utils::PageQuery;

const REVIEW_TEXT_MESSAGE: &str = "Review content is required";
const RATING_MESSAGE: &str = "Rating must be between 1 and 5";
const STALE_VERSION: &str = "Review was modified by another request. Reload and try again.";

fn reviews(ctx: &AppContext) -> Collection<Review> {
    Collection::new(ctx.store.clone(), COLLECTION)
}

fn check_id(id: &str, field: &str, message: &str) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    errors.check(is_valid_id(id), field, message);
    errors.finish()
}

async fn load_review(ctx: &AppContext, review_id: &str) -> Result<Review, AppError> {
    check_id(review_id, "reviewId", "Invalid review ID")?;
    reviews(ctx)
        .find_by_id(review_id)
        .await
        .context("failed to load review")?
        .ok_or_else(|| AppError::not_found("Review not found."))
}

/// Stored version equals `expected`. Reviews written before versioning carry
/// no field and read as version 1.
fn version_matches(expected: u64) -> Filter {
    let stored = Filter::eq("version", expected);
    if expected == 1 {
        Filter::or(vec![stored, Filter::missing("version")])
    } else {
        stored
    }
}

/// Fetch the referenced documents of `collection` in one query, keyed by id.
async fn resolve<T>(
    ctx: &AppContext,
    collection: &'static str,
    ids: impl IntoIterator<Item = String>,
) -> Result<HashMap<String, T>, AppError>
where
    T: DeserializeOwned,
{
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();

    let found: Vec<Document> = ctx
        .store
        .find(collection, &FindQuery::new(Filter::is_in(ID_FIELD, ids)))
        .await
        .with_context(|| format!("failed to resolve {collection} references"))?;

    found
        .into_iter()
        .map(|document| {
            let id = document
                .get(ID_FIELD)
                .and_then(|id| id.as_str())
                .unwrap_or_default()
                .to_string();
            shelf_db::from_document::<T>(document).map(|value| (id, value))
        })
        .collect::<Result<HashMap<String, T>, _>>()
        .with_context(|| format!("failed to decode {collection} reference"))
        .map_err(AppError::from)
}

async fn page_of(
    ctx: &AppContext,
    filter: Filter,
    page: &PageQuery,
) -> Result<(u64, Vec<Review>), AppError> {
    let window = page.window(ctx.listing);
    let collection = reviews(ctx);
    let total = collection
        .count(&filter)
        .await
        .context("failed to count reviews")?;
    let results = collection
        .find(
            &FindQuery::new(filter)
                .sort_by(ID_FIELD, SortOrder::Ascending)
                .skip(window.offset)
                .limit(window.limit),
        )
        .await
        .context("failed to list reviews")?;
    Ok((total, results))
}

pub async fn add_review(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    JsonBody(input): JsonBody<NewReview>,
) -> Result<ApiResponse<Review>, AppError> {
    let mut errors = FieldErrors::new();
    let book_id = input.book_id.unwrap_or_default();
    errors.check(is_valid_id(&book_id), "bookId", "Invalid book ID");
    let review_text = non_blank(input.review_text.as_deref());
    errors.check(review_text.is_some(), "reviewText", REVIEW_TEXT_MESSAGE);
    let score = input.rating.as_ref().and_then(rating);
    errors.check(score.is_some(), "rating", RATING_MESSAGE);
    errors.finish()?;

    let book_exists = books::handlers::books(&ctx)
        .find_by_id(&book_id)
        .await
        .context("failed to check reviewed book")?
        .is_some();
    if !book_exists {
        return Err(AppError::bad_request("Book does not exist."));
    }

    let now = OffsetDateTime::now_utc();
    let review = Review {
        id: Uuid::now_v7().to_string(),
        user: auth.id,
        book: book_id,
        rating: score.unwrap_or_default(),
        review_text: review_text.unwrap_or_default(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    let review = reviews(&ctx)
        .insert(&review)
        .await
        .context("failed to store review")?;

    tracing::info!(review_id = %review.id, book_id = %review.book, "review added");
    Ok(ApiResponse::created("Review added successfully", review))
}

pub async fn edit_review(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(review_id): Path<String>,
    body: Bytes,
) -> Result<ApiResponse<Review>, AppError> {
    let review = load_review(&ctx, &review_id).await?;
    auth.ensure_owner(&review.user, "Not authorized to edit this review.")?;
    let changes: ReviewChanges = decode_json(&body)?;

    if changes.review_text.is_none() && changes.rating.is_none() {
        return Err(AppError::bad_request("At least one field is required for update."));
    }

    let mut errors = FieldErrors::new();
    let review_text = match changes.review_text.as_deref() {
        None => None,
        Some(text) => {
            let text = non_blank(Some(text));
            errors.check(text.is_some(), "reviewText", REVIEW_TEXT_MESSAGE);
            text
        }
    };
    let score = match changes.rating.as_ref() {
        None => None,
        Some(value) => {
            let score = rating(value);
            errors.check(score.is_some(), "rating", RATING_MESSAGE);
            score
        }
    };
    errors.finish()?;

    let expected = changes.version.unwrap_or(review.version);
    if expected != review.version {
        return Err(AppError::conflict(
            vec![serde_json::json!({ "field": "version", "message": format!("current version is {}", review.version) })],
            STALE_VERSION,
        ));
    }

    let patch = ReviewPatch {
        review_text,
        rating: score,
        version: expected + 1,
        updated_at: OffsetDateTime::now_utc(),
    };
    let updated = reviews(&ctx)
        .update_one(
            &Filter::id(&review_id).and(version_matches(expected)),
            &patch,
        )
        .await
        .context("failed to update review")?
        .ok_or_else(|| AppError::conflict(vec![], STALE_VERSION))?;

    Ok(ApiResponse::ok("Review updated successfully", updated))
}

pub async fn delete_review(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(review_id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let review = load_review(&ctx, &review_id).await?;
    auth.ensure_owner(&review.user, "Not authorized to delete this review.")?;

    reviews(&ctx)
        .delete_by_id(&review_id)
        .await
        .context("failed to delete review")?;

    tracing::info!(review_id = %review_id, "review deleted");
    Ok(ApiResponse::message("Review deleted successfully"))
}

pub async fn get_review(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Path(review_id): Path<String>,
) -> Result<ApiResponse<ReviewView<String, Option<BookSummary>>>, AppError> {
    let review = load_review(&ctx, &review_id).await?;
    let book = Collection::<BookSummary>::new(ctx.store.clone(), books::COLLECTION)
        .find_by_id(&review.book)
        .await
        .context("failed to load reviewed book")?;

    let user = review.user.clone();
    Ok(ApiResponse::ok(
        "Review fetched successfully",
        review.populate(user, book),
    ))
}

pub async fn book_reviews(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Path(book_id): Path<String>,
    QueryParams(page): QueryParams<PageQuery>,
) -> Result<ApiResponse<ReviewPage<ReviewView<Option<UserSummary>, String>>>, AppError> {
    check_id(&book_id, "bookId", "Invalid book ID")?;
    let (total, results) = page_of(&ctx, Filter::eq("book", book_id.as_str()), &page).await?;

    let authors: HashMap<String, UserSummary> =
        resolve(&ctx, users::COLLECTION, results.iter().map(|r| r.user.clone())).await?;
    let reviews = results
        .into_iter()
        .map(|review| {
            let user = authors.get(&review.user).cloned();
            let book = review.book.clone();
            review.populate(user, book)
        })
        .collect();

    Ok(ApiResponse::ok(
        "Reviews fetched successfully",
        ReviewPage { total, reviews },
    ))
}

pub async fn user_reviews(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Path(user_id): Path<String>,
    QueryParams(page): QueryParams<PageQuery>,
) -> Result<ApiResponse<ReviewPage<ReviewView<String, Option<BookTitle>>>>, AppError> {
    check_id(&user_id, "userId", "Invalid user ID")?;
    let (total, results) = page_of(&ctx, Filter::eq("user", user_id.as_str()), &page).await?;

    let titles: HashMap<String, BookTitle> =
        resolve(&ctx, books::COLLECTION, results.iter().map(|r| r.book.clone())).await?;
    let reviews = results
        .into_iter()
        .map(|review| {
            let book = titles.get(&review.book).cloned();
            let user = review.user.clone();
            review.populate(user, book)
        })
        .collect();

    Ok(ApiResponse::ok(
        "User reviews fetched successfully",
        ReviewPage { total, reviews },
    ))
}
