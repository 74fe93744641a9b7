//! Error types for the fault-diagnosis assistant

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Conversation index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Graph search error: {0}")]
    GraphSearch(String),

    #[error("Answer generation error: {0}")]
    Answerer(String),

    #[error("OpenAI API error: {0}")]
    OpenAiError(String),

    #[error("Neo4j error: {0}")]
    Neo4jError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Failed to acquire history lock: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::Neo4jError(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for Error {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Error::OpenAiError(err.to_string())
    }
}
