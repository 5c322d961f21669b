mod client;

use crate::core::models::TrackedImage;
use async_trait::async_trait;
use thiserror::Error;

pub use client::GalleryClient;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authorized: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Cannot upload: {0}")]
    InvalidUpload(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Produces the full current list of tracked images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<TrackedImage>, ApiError>;
}

/// Deletes one image by identifier.
#[async_trait]
pub trait ImageDeleter: Send + Sync {
    async fn delete_by_id(&self, image_id: &str) -> Result<(), ApiError>;
}
