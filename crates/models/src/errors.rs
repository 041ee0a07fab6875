use thiserror::Error;

/// Failure turning stored data into a [`crate::MapRecord`] or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("stored record is {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("stored record has an invalid shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("invalid field {field}: {reason}")]
    Field { field: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Db(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
