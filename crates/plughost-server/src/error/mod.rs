//! Error handling for the HTTP surface.

pub mod response;
pub mod types;

pub use types::{ApiError, ApiResult};
