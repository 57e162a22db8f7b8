//! Shape checks for auth request bodies. Every rule runs; violations are
//! reported in field order (username, email, password).

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::auth::dto::{LoginRequest, RegisterRequest};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 8;

/// Registration fields that passed validation. Username and email are
/// lower-cased; the password is kept as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(concat!(
            r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*",
            r"@(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
        ))
        .unwrap();
    }
    EMAIL_RE.is_match(email)
}

enum Field<'a> {
    Missing,
    NotString,
    Text(&'a str),
}

fn field(value: Option<&Value>) -> Field<'_> {
    match value {
        None | Some(Value::Null) => Field::Missing,
        Some(Value::String(s)) if s.is_empty() => Field::Missing,
        Some(Value::String(s)) => Field::Text(s),
        Some(_) => Field::NotString,
    }
}

fn check_username(username: Option<&Value>, errors: &mut Vec<String>) -> Option<String> {
    match field(username) {
        Field::Missing => errors.push("Username is required".into()),
        Field::NotString => errors.push("Username must be a string".into()),
        Field::Text(u) => {
            // Bounds apply to the stored form; lower-casing can add characters.
            let normalized = u.to_lowercase();
            let len = normalized.chars().count();
            if len < USERNAME_MIN {
                errors.push("Username must be at least 3 characters long".into());
            } else if len > USERNAME_MAX {
                errors.push("Username cannot exceed 30 characters".into());
            } else {
                return Some(normalized);
            }
        }
    }
    None
}

fn check_email(email: Option<&Value>, errors: &mut Vec<String>) -> Option<String> {
    match field(email) {
        Field::Missing => errors.push("Email is required".into()),
        Field::NotString => errors.push("Email must be a string".into()),
        Field::Text(e) if !is_valid_email(e) => errors.push("Invalid email format".into()),
        Field::Text(e) => return Some(e.to_lowercase()),
    }
    None
}

fn check_password(password: Option<&Value>, errors: &mut Vec<String>) -> Option<String> {
    match field(password) {
        Field::Missing => errors.push("Password is required".into()),
        Field::NotString => errors.push("Password must be a string".into()),
        Field::Text(p) if p.chars().count() < PASSWORD_MIN => {
            errors.push("Password must be at least 8 characters long".into())
        }
        Field::Text(p) => return Some(p.to_owned()),
    }
    None
}

pub fn validate_register(req: &RegisterRequest) -> Result<RegisterInput, Vec<String>> {
    let mut errors = Vec::new();
    let username = check_username(req.username.as_ref(), &mut errors);
    let email = check_email(req.email.as_ref(), &mut errors);
    let password = check_password(req.password.as_ref(), &mut errors);

    match (username, email, password) {
        (Some(username), Some(email), Some(password)) => Ok(RegisterInput {
            username,
            email,
            password,
        }),
        _ => Err(errors),
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<LoginInput, Vec<String>> {
    let mut errors = Vec::new();
    let email = check_email(req.email.as_ref(), &mut errors);
    let password = check_password(req.password.as_ref(), &mut errors);

    match (email, password) {
        (Some(email), Some(password)) => Ok(LoginInput { email, password }),
        _ => Err(errors),
    }
}
