use thiserror::Error;

/// Errors returned by gallery operations
///
/// Each variant maps onto one HTTP status class, see [`GalleryError::status`].
#[derive(Error, Debug)]
pub enum GalleryError {
    /// Name is empty, absolute, or escapes the managed folder
    #[error("invalid filename")]
    InvalidName,

    /// File does not exist (or is not a regular file)
    #[error("not found")]
    NotFound,

    /// File exists but its extension is not a supported image extension
    #[error("forbidden")]
    Forbidden,

    /// Request was understood but the target is not acceptable
    #[error("{0}")]
    InvalidInput(String),

    /// External converter failure or other processing problem
    #[error("{0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GalleryError {
    /// HTTP status code for this error
    pub fn status(&self) -> u16 {
        match self {
            GalleryError::InvalidName | GalleryError::InvalidInput(_) => 400,
            GalleryError::Forbidden => 403,
            GalleryError::NotFound => 404,
            GalleryError::Processing(_) | GalleryError::Io(_) | GalleryError::Json(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
