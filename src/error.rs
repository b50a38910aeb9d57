use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cascade deserialization error: {0}")]
    Deserialization(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Logic invariant violated: {0}")]
    LogicInvariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
