//! Submitted payloads and their validation.
//!
//! Validation is explicit: each form exposes a `validate` function returning
//! `Result`, composed by the caller. Field errors surface as
//! [`AppError::Validation`]; duplicate identity fields as
//! [`AppError::Conflict`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::identity::Role;
use crate::storage::SharedStore;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("username regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            format!("empty_{field}"),
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, cap: usize) -> AppResult<()> {
    if value.chars().count() > cap {
        return Err(AppError::validation(
            format!("{field}_too_long"),
            format!("{field} must be at most {cap} characters"),
        ));
    }
    Ok(())
}

fn valid_email(email: &str) -> AppResult<()> {
    required("email", email)?;
    max_len("email", email, 64)?;
    if !EMAIL_RE.is_match(email) {
        return Err(AppError::validation("bad_email", "not a valid email address"));
    }
    Ok(())
}

fn valid_username(username: &str) -> AppResult<()> {
    required("username", username)?;
    max_len("username", username, 64)?;
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::validation(
            "bad_username",
            "usernames must have only letters, numbers, dots and underscores",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub body: String,
}

impl PostForm {
    pub fn validate(&self) -> AppResult<()> {
        required("body", &self.body)
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub body: String,
}

impl CommentForm {
    pub fn validate(&self) -> AppResult<()> {
        required("body", &self.body)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> AppResult<()> {
        valid_email(&self.email)?;
        valid_username(&self.username)?;
        required("password", &self.password)
    }
}

/// Self-service profile edit: descriptive fields only.
#[derive(Debug, Deserialize)]
pub struct EditProfileForm {
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
}

impl EditProfileForm {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            max_len("name", name, 64)?;
        }
        if let Some(location) = &self.location {
            max_len("location", location, 64)?;
        }
        Ok(())
    }
}

/// Administrator profile edit: identity fields included. The duplicate
/// checks compare the submitted value against the account being edited, so
/// resubmitting a user's current email or username is not a conflict.
#[derive(Debug, Deserialize)]
pub struct EditProfileAdminForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub confirmed: Option<bool>,
    pub role: Option<Role>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
}

impl EditProfileAdminForm {
    pub fn validate(&self, store: &SharedStore, edited_user_id: u64) -> AppResult<()> {
        let current = store
            .user(edited_user_id)
            .ok_or_else(|| AppError::not_found("no_user", "user not found"))?;
        if let Some(email) = &self.email {
            valid_email(email)?;
            if !email.eq_ignore_ascii_case(&current.email)
                && store.email_taken_by_other(email, edited_user_id)
            {
                return Err(AppError::conflict("duplicate_email", "email already registered"));
            }
        }
        if let Some(username) = &self.username {
            valid_username(username)?;
            if username != &current.username
                && store.username_taken_by_other(username, edited_user_id)
            {
                return Err(AppError::conflict("duplicate_username", "username already in use"));
            }
        }
        if let Some(name) = &self.name {
            max_len("name", name, 64)?;
        }
        if let Some(location) = &self.location {
            max_len("location", location, 64)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_body_must_not_be_empty() {
        assert!(PostForm { body: String::new() }.validate().is_err());
        assert!(PostForm { body: "   ".into() }.validate().is_err());
        assert!(PostForm { body: "hello".into() }.validate().is_ok());
    }

    #[test]
    fn register_form_field_rules() {
        let ok = RegisterForm {
            email: "john@example.com".into(),
            username: "john.doe_2".into(),
            password: "cat".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = RegisterForm { email: "not-an-email".into(), ..register("john") };
        assert!(bad_email.validate().is_err());

        let bad_username = RegisterForm { username: "2john".into(), ..register("john") };
        assert!(bad_username.validate().is_err());

        let no_password = RegisterForm { password: String::new(), ..register("john") };
        assert!(no_password.validate().is_err());
    }

    fn register(username: &str) -> RegisterForm {
        RegisterForm {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            password: "cat".into(),
        }
    }

    #[test]
    fn profile_length_caps() {
        let long = "x".repeat(65);
        let form = EditProfileForm { name: Some(long), location: None, about_me: None };
        assert!(form.validate().is_err());
        let form = EditProfileForm {
            name: Some("John".into()),
            location: Some("Shanghai".into()),
            about_me: Some("y".repeat(500)),
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn admin_duplicate_checks_skip_the_edited_user() {
        let store = SharedStore::new(None);
        let john = store.register("john@example.com", "john", "cat").unwrap();
        store.register("jane@example.com", "jane", "dog").unwrap();

        // Resubmitting the user's own email is not a conflict.
        let own = EditProfileAdminForm {
            email: Some("john@example.com".into()),
            username: Some("john".into()),
            confirmed: Some(true),
            role: None,
            name: None,
            location: None,
            about_me: None,
        };
        assert!(own.validate(&store, john.id).is_ok());

        // Taking another account's email is.
        let stolen = EditProfileAdminForm {
            email: Some("jane@example.com".into()),
            username: None,
            confirmed: None,
            role: None,
            name: None,
            location: None,
            about_me: None,
        };
        let err = stolen.validate(&store, john.id).unwrap_err();
        assert_eq!(err.http_status(), 409);

        let stolen_name = EditProfileAdminForm {
            email: None,
            username: Some("jane".into()),
            confirmed: None,
            role: None,
            name: None,
            location: None,
            about_me: None,
        };
        assert_eq!(stolen_name.validate(&store, john.id).unwrap_err().http_status(), 409);
    }
}
