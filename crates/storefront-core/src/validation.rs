//! Field validation for the auth forms.
//!
//! Each field is checked against an ordered list of rules. Every failing rule
//! contributes its message, so a form reports all of its problems at once
//! rather than stopping at the first.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::Avatar;

/// Passwords shorter than this are rejected.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Largest avatar accepted at registration (2 MiB).
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Image types the backend stores as avatars.
pub const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

pub const PASSWORD_MISMATCH: &str = "Passwords do not match";

/// A predicate paired with the message reported when it fails.
pub struct Rule<T: ?Sized> {
    pub check: fn(&T) -> bool,
    pub message: &'static str,
}

pub const EMAIL_RULES: &[Rule<str>] = &[Rule {
    check: is_email,
    message: "Invalid email address",
}];

pub const PASSWORD_RULES: &[Rule<str>] = &[
    Rule {
        check: has_min_length,
        message: "Password must be at least 8 characters long",
    },
    Rule {
        check: has_uppercase,
        message: "Password must contain at least one uppercase letter",
    },
    Rule {
        check: has_lowercase,
        message: "Password must contain at least one lowercase letter",
    },
    Rule {
        check: has_digit,
        message: "Password must contain at least one number",
    },
    Rule {
        check: has_symbol,
        message: "Password must contain at least one special character",
    },
];

pub const CONFIRM_PASSWORD_RULES: &[Rule<str>] = &[Rule {
    check: has_min_length,
    message: "Password must be at least 8 characters long",
}];

pub const AVATAR_RULES: &[Rule<Avatar>] = &[
    Rule {
        check: avatar_within_size,
        message: "Avatar size must be less than 2 MB",
    },
    Rule {
        check: avatar_has_image_type,
        message: "Invalid image type",
    },
];

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
            .expect("email pattern is a valid regex")
    })
}

pub fn is_email(value: &str) -> bool {
    !value.starts_with('.') && !value.contains("..") && email_pattern().is_match(value)
}

fn has_min_length(value: &str) -> bool {
    value.chars().count() >= MIN_PASSWORD_LENGTH
}

fn has_uppercase(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_uppercase())
}

fn has_lowercase(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_lowercase())
}

fn has_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

// Anything outside [A-Za-z0-9] counts, including whitespace and non-ASCII.
fn has_symbol(value: &str) -> bool {
    value.chars().any(|c| !c.is_ascii_alphanumeric())
}

fn avatar_within_size(avatar: &Avatar) -> bool {
    avatar.size() <= MAX_AVATAR_BYTES
}

fn avatar_has_image_type(avatar: &Avatar) -> bool {
    ACCEPTED_IMAGE_TYPES.contains(&avatar.content_type.as_str())
}

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every rule against `value`, recording each failure under `field`.
    pub fn check<T: ?Sized>(&mut self, field: &str, value: &T, rules: &[Rule<T>]) {
        for rule in rules {
            if !(rule.check)(value) {
                self.add(field, rule.message);
            }
        }
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for `field`, empty when the field passed.
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in self.fields() {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}
