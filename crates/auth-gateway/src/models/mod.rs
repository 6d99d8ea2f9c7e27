//! Request/response DTOs

pub mod auth;
pub mod common;

pub use auth::*;
pub use common::*;
