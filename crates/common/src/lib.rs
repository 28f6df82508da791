pub mod api;
pub mod config;
pub mod error;

pub use error::{MultiApiError, Result};
