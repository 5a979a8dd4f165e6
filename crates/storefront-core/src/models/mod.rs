//! Data models exchanged with the storefront backend.
//!
//! This module contains:
//!
//! - `User`: the authenticated account record returned by the auth endpoints
//! - `Credentials`, `Registration`, `Avatar`: form input sent to the backend

pub mod forms;
pub mod user;

pub use forms::{Avatar, Credentials, Registration};
pub use user::User;
