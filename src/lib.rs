// Map Gateway Library

pub mod api;
pub mod config;
pub mod domain;
pub mod errors;
pub mod maps;
pub mod observability;
pub mod rate_limit;
pub mod store;

pub use crate::config::Config;
pub use crate::errors::{AppError, Result};
