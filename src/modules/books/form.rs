//! Multipart book form: text fields plus an optional `image` file staged to
//! disk.

use std::collections::HashMap;

use anyhow::Context;
use axum::extract::{multipart::MultipartError, Multipart};

use shelf_http::{AppError, FieldErrors};
use shelf_integrations::StagedFile;
use shelf_kernel::settings::MediaSettings;

use super::models::BookPatch;
use crate::utils::validation::non_blank;

const IMAGE_FIELD: &str = "image";

fn multipart_error(err: MultipartError) -> AppError {
    AppError::bad_request(err.body_text())
}

#[derive(Debug, Default)]
pub struct BookForm {
    fields: HashMap<String, String>,
    pub image: Option<StagedFile>,
}

/// Fields of a fully specified book.
#[derive(Debug)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    pub published_year: u32,
}

const TEXT_FIELDS: [(&str, &str); 4] = [
    ("title", "Title is required"),
    ("author", "Author is required"),
    ("genre", "Genre is required"),
    ("description", "Description is required"),
];
const YEAR_FIELD: &str = "publishedYear";
const YEAR_MESSAGE: &str = "Published Year must be a positive integer";

impl BookForm {
    /// Drain `multipart`. The image is written under `media.temp_dir` and
    /// removed again when the form drops.
    pub async fn read(mut multipart: Multipart, media: &MediaSettings) -> Result<Self, AppError> {
        let mut form = BookForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name != IMAGE_FIELD {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
                continue;
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.is_empty() {
                continue;
            }
            if bytes.len() > media.max_upload_bytes {
                return Err(AppError::bad_request(format!(
                    "Image exceeds the {} byte upload limit",
                    media.max_upload_bytes
                )));
            }

            let staged = StagedFile::write(
                &media.temp_dir,
                file_name.as_deref(),
                content_type.as_deref(),
                &bytes,
            )
            .await
            .context("failed to stage uploaded image")?;
            form.image = Some(staged);
        }

        Ok(form)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Every field required.
    pub fn new_book(&self) -> Result<NewBook, AppError> {
        let mut errors = FieldErrors::new();
        let mut text = TEXT_FIELDS.map(|(name, message)| {
            let value = non_blank(self.field(name));
            errors.check(value.is_some(), name, message);
            value.unwrap_or_default()
        });
        let published_year = parse_year(self.field(YEAR_FIELD));
        errors.check(published_year.is_some(), YEAR_FIELD, YEAR_MESSAGE);
        errors.finish()?;

        Ok(NewBook {
            title: std::mem::take(&mut text[0]),
            author: std::mem::take(&mut text[1]),
            genre: std::mem::take(&mut text[2]),
            description: std::mem::take(&mut text[3]),
            published_year: published_year.unwrap_or_default(),
        })
    }

    /// Only the fields present; each one still has to be valid.
    pub fn patch(&self) -> Result<BookPatch, AppError> {
        let mut errors = FieldErrors::new();
        let mut text = TEXT_FIELDS.map(|(name, message)| {
            let raw = self.field(name)?;
            let value = non_blank(Some(raw));
            errors.check(value.is_some(), name, message);
            value
        });
        let published_year = match self.field(YEAR_FIELD) {
            None => None,
            Some(raw) => {
                let year = parse_year(Some(raw));
                errors.check(year.is_some(), YEAR_FIELD, YEAR_MESSAGE);
                year
            }
        };
        errors.finish()?;

        Ok(BookPatch {
            title: text[0].take(),
            author: text[1].take(),
            genre: text[2].take(),
            description: text[3].take(),
            published_year,
            ..BookPatch::default()
        })
    }
}

fn parse_year(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok()
}
