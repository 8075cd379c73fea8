//! Field-level validation accumulator.

use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collects failures in the order checks run.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record `message` for `field` unless `valid`. Returns `valid`.
    pub fn check(&mut self, valid: bool, field: &str, message: &str) -> bool {
        if !valid {
            self.add(field, message);
        }
        valid
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// `Ok` when nothing failed, otherwise a validation error listing every
    /// failure.
    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let details = self
            .errors
            .into_iter()
            .map(|error| serde_json::json!({ "field": error.field, "message": error.message }))
            .collect();
        Err(AppError::validation(details, "Validation failed"))
    }
}
