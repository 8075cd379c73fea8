//! Account input rules.

use shelf_http::{AppError, FieldErrors};

use super::models::{ForgotPassword, LoginUser, RegisterUser, ResetPassword};

const EMAIL_MESSAGE: &str = "Valid email is required.";

/// Trimmed, lower-cased address when it looks deliverable.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty());
    valid.then_some(email)
}

/// At least 8 characters with a lowercase letter, an uppercase letter, a
/// digit and a character outside `[A-Za-z0-9_]`.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_ascii_alphanumeric() && c != '_')
}

fn check_email(errors: &mut FieldErrors, raw: Option<&str>) -> String {
    match raw.and_then(normalize_email) {
        Some(email) => email,
        None => {
            errors.add("email", EMAIL_MESSAGE);
            String::new()
        }
    }
}

fn check_new_password(errors: &mut FieldErrors, field: &str, label: &str, password: &str) {
    if password.chars().count() < 8 {
        errors.add(field, format!("{label} must be at least 8 characters long."));
    } else if !is_strong_password(password) {
        errors.add(
            field,
            format!(
                "{label} must include one special character, one lowercase letter, one uppercase letter, and one numeric value."
            ),
        );
    }
}

pub struct ValidRegistration {
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub password: String,
}

pub fn registration(input: RegisterUser) -> Result<ValidRegistration, AppError> {
    let mut errors = FieldErrors::new();
    let email = check_email(&mut errors, input.email.as_deref());

    let first_name = input.first_name.unwrap_or_default().trim().to_string();
    let first_len = first_name.chars().count();
    errors.check(
        (3..=20).contains(&first_len),
        "firstName",
        "First name should be 3-20 characters long.",
    );

    let last_name = input
        .last_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    errors.check(
        last_name.as_ref().is_none_or(|name| name.chars().count() <= 20),
        "lastName",
        "Last name should not exceed 20 characters.",
    );

    let password = input.password.unwrap_or_default();
    check_new_password(&mut errors, "password", "Password", &password);

    errors.finish()?;
    Ok(ValidRegistration {
        email,
        first_name,
        last_name,
        password,
    })
}

pub fn login(input: LoginUser) -> Result<(String, String), AppError> {
    let mut errors = FieldErrors::new();
    let email = check_email(&mut errors, input.email.as_deref());
    let password = input.password.unwrap_or_default();
    errors.check(!password.is_empty(), "password", "Password is required.");
    errors.finish()?;
    Ok((email, password))
}

pub fn forgot_password(input: ForgotPassword) -> Result<String, AppError> {
    let mut errors = FieldErrors::new();
    let email = check_email(&mut errors, input.email.as_deref());
    errors.finish()?;
    Ok(email)
}

pub struct ValidReset {
    pub email: String,
    pub old_password: String,
    pub new_password: String,
}

pub fn reset_password(input: ResetPassword) -> Result<ValidReset, AppError> {
    let mut errors = FieldErrors::new();
    let email = check_email(&mut errors, input.email.as_deref());
    let old_password = input.old_password.unwrap_or_default();
    errors.check(!old_password.is_empty(), "oldPassword", "Old password is required.");
    let new_password = input.new_password.unwrap_or_default();
    check_new_password(&mut errors, "newPassword", "New Password", &new_password);
    errors.finish()?;
    Ok(ValidReset {
        email,
        old_password,
        new_password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation { details, .. } => details
                .iter()
                .map(|d| d["field"].as_str().unwrap().to_string())
                .collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(
            normalize_email("  Reader@Example.COM "),
            Some("reader@example.com".to_string())
        );
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("a@b"), None);
        assert_eq!(normalize_email("a@@b.com"), None);
        assert_eq!(normalize_email("a b@c.com"), None);
        assert_eq!(normalize_email("a@b..com"), None);
    }

    #[test]
    fn password_strength() {
        assert!(is_strong_password("Passw0rd!"));
        assert!(!is_strong_password("password1!"));
        assert!(!is_strong_password("PASSWORD1!"));
        assert!(!is_strong_password("Password!!"));
        assert!(!is_strong_password("Password1_"));
        assert!(!is_strong_password("Pa1!"));
    }

    #[test]
    fn registration_reports_every_field_in_order() {
        let err = registration(RegisterUser {
            email: Some("bad".into()),
            first_name: Some("Al".into()),
            last_name: Some("x".repeat(21)),
            password: Some("short".into()),
        })
        .err()
        .unwrap();
        assert_eq!(fields(err), ["email", "firstName", "lastName", "password"]);
    }

    #[test]
    fn valid_registration_is_normalized() {
        let valid = registration(RegisterUser {
            email: Some(" Ada@Example.com".into()),
            first_name: Some(" Ada ".into()),
            last_name: Some("  ".into()),
            password: Some("Passw0rd!".into()),
        })
        .ok()
        .unwrap();
        assert_eq!(valid.email, "ada@example.com");
        assert_eq!(valid.first_name, "Ada");
        assert_eq!(valid.last_name, None);
    }

    #[test]
    fn reset_requires_strong_new_password() {
        let err = reset_password(ResetPassword {
            email: Some("ada@example.com".into()),
            old_password: Some("whatever".into()),
            new_password: Some("alllowercase1!".into()),
        })
        .err()
        .unwrap();
        assert_eq!(fields(err), ["newPassword"]);
    }

    #[test]
    fn login_requires_password() {
        let err = login(LoginUser {
            email: Some("ada@example.com".into()),
            password: None,
        })
        .err()
        .unwrap();
        assert_eq!(fields(err), ["password"]);
    }
}
