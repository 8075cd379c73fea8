use anyhow::Context;
use axum::extract::{multipart::MultipartRejection, Multipart, Path, State};
use time::OffsetDateTime;
use uuid::Uuid;

use shelf_authz::AuthUser;
use shelf_db::{Collection, Filter};
use shelf_http::{ApiResponse, AppError, QueryParams};

use super::form::BookForm;
use super::listing::{listing_pipeline, search_filter};
use super::models::{Book, BookListing, BookPage, ListingQuery};
use super::COLLECTION;
use crate::context::AppContext;
use crate::modules::reviews;
use crate::utils::validation::is_valid_id;
use crate::utils::PageWindow;

pub(crate) fn books(ctx: &AppContext) -> Collection<Book> {
    Collection::new(ctx.store.clone(), COLLECTION)
}

fn check_id(id: &str) -> Result<(), AppError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(AppError::validation(
            vec![serde_json::json!({ "field": "id", "message": "Invalid book ID" })],
            "Validation failed",
        ))
    }
}

fn multipart(payload: Result<Multipart, MultipartRejection>) -> Result<Multipart, AppError> {
    payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

pub async fn list_books(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    QueryParams(query): QueryParams<ListingQuery>,
) -> Result<ApiResponse<BookPage>, AppError> {
    let window = PageWindow::resolve(query.limit.as_deref(), query.offset.as_deref(), ctx.listing);
    let filter = search_filter(query.search.as_deref());

    let books = books(&ctx);
    let rows: Vec<BookListing> = books
        .aggregate(&listing_pipeline(filter.clone(), window))
        .await
        .context("failed to aggregate book listing")?;
    let total_books = books
        .count(&filter)
        .await
        .context("failed to count books")?;

    Ok(ApiResponse::ok(
        "Books fetched successfully",
        BookPage {
            books: rows,
            total_books,
            window,
        },
    ))
}

pub async fn get_book(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Book>, AppError> {
    check_id(&id)?;
    let book = books(&ctx)
        .find_by_id(&id)
        .await
        .context("failed to load book")?
        .ok_or_else(|| AppError::not_found("Book not found"))?;

    Ok(ApiResponse::ok("Book fetched successfully", book))
}

pub async fn add_book(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    payload: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Book>, AppError> {
    auth.require_admin()?;
    let form = BookForm::read(multipart(payload)?, &ctx.media).await?;
    let fields = form.new_book()?;
    let staged = form
        .image
        .as_ref()
        .ok_or_else(|| AppError::bad_request("Image is required"))?;

    let image = ctx.images.upload(staged).await.context("Error uploading image")?;

    let now = OffsetDateTime::now_utc();
    let book = Book {
        id: Uuid::now_v7().to_string(),
        title: fields.title,
        author: fields.author,
        genre: fields.genre,
        description: fields.description,
        published_year: fields.published_year,
        image: Some(image.secure_url),
        created_at: now,
        updated_at: now,
    };
    let book = books(&ctx).insert(&book).await.context("failed to store book")?;

    tracing::info!(book_id = %book.id, admin = %auth.id, "book added");
    Ok(ApiResponse::created("Book added successfully", book))
}

pub async fn edit_book(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Book>, AppError> {
    auth.require_admin()?;
    check_id(&id)?;
    let form = BookForm::read(multipart(payload)?, &ctx.media).await?;
    let mut patch = form.patch()?;
    if patch.is_empty() && form.image.is_none() {
        return Err(AppError::bad_request("At least one field is required for update."));
    }

    let books = books(&ctx);
    books
        .find_by_id(&id)
        .await
        .context("failed to load book")?
        .ok_or_else(|| AppError::not_found("Book not found"))?;

    if let Some(staged) = form.image.as_ref() {
        let image = ctx.images.upload(staged).await.context("Error uploading image")?;
        patch.image = Some(image.secure_url);
    }
    patch.updated_at = Some(OffsetDateTime::now_utc());

    let book = books
        .update_one(&Filter::id(&id), &patch)
        .await
        .context("failed to update book")?
        .ok_or_else(|| AppError::not_found("Book not found"))?;

    tracing::info!(book_id = %book.id, admin = %auth.id, "book updated");
    Ok(ApiResponse::ok("Book updated successfully", book))
}

pub async fn delete_book(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Book>, AppError> {
    auth.require_admin()?;
    check_id(&id)?;

    let book = books(&ctx)
        .delete_by_id(&id)
        .await
        .context("failed to delete book")?
        .ok_or_else(|| AppError::not_found("Book not found"))?;

    let removed = ctx
        .store
        .delete_many(reviews::COLLECTION, &Filter::eq("book", id.as_str()))
        .await
        .context("failed to delete reviews of book")?;

    tracing::info!(book_id = %book.id, reviews_removed = removed, admin = %auth.id, "book deleted");
    Ok(ApiResponse::ok("Book deleted successfully", book))
}
