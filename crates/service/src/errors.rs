use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport, auth, protocol or decoding failure talking to storage.
    #[error("{backend} backend unavailable: {source}")]
    Unavailable {
        backend: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn unavailable(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Unavailable { backend, source: source.into() }
    }
}
