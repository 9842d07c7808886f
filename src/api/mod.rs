pub mod client;

pub use client::{ApiClient, ApiClientBuilder, ApiError, Result};
