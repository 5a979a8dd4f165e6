//! Form input submitted to the auth endpoints.
//!
//! None of these are retained once the request resolves. `Debug` output never
//! includes passwords or avatar bytes.

use std::fmt;

use serde::Serialize;

use crate::validation::{self, FieldErrors};

/// Login form input, posted as JSON to `POST /api/auth/login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Check every field, reporting all violations at once.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check("email", self.email.as_str(), validation::EMAIL_RULES);
        errors.check("password", self.password.as_str(), validation::PASSWORD_RULES);
        errors.into_result()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An image attached to a registration.
#[derive(Clone)]
pub struct Avatar {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Avatar {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for Avatar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Avatar")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Sign-up form input, posted as multipart to `POST /api/users`.
#[derive(Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub avatar: Option<Avatar>,
}

impl Registration {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check("email", self.email.as_str(), validation::EMAIL_RULES);
        errors.check("password", self.password.as_str(), validation::PASSWORD_RULES);
        errors.check(
            "confirm_password",
            self.confirm_password.as_str(),
            validation::CONFIRM_PASSWORD_RULES,
        );
        if self.password != self.confirm_password {
            errors.add("confirm_password", validation::PASSWORD_MISMATCH);
        }
        if let Some(ref avatar) = self.avatar {
            errors.check("avatar", avatar, validation::AVATAR_RULES);
        }
        errors.into_result()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("confirm_password", &"<redacted>")
            .field("avatar", &self.avatar)
            .finish()
    }
}
