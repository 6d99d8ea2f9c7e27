//! HTTP request handlers

pub mod admin;
pub mod auth;
pub mod health;

pub use admin::*;
pub use auth::*;
pub use health::*;
