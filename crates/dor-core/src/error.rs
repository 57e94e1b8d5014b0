use thiserror::Error;

#[derive(Debug, Error)]
pub enum DorError {
    #[error("ticket has no usable identifier or title")]
    MissingIdentity,

    #[error("ticket record must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown card type: {0}")]
    UnknownCardType(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown verbosity '{0}': expected brief, balanced or detailed")]
    UnknownVerbosity(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DorError>;
