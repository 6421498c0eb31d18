use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid size value: {0}. Expected one of: small, medium, large")]
    InvalidSize(String),

    #[error("Missing required parameter(s): {}", .0.join(", "))]
    MissingParameter(Vec<String>),

    #[error("Engine {0} not found")]
    EngineNotFound(String),

    #[error("Engine {engine} has an invalid size catalog: {reason}")]
    InvalidSizeCatalog { engine: String, reason: String },

    #[error("Engine {engine} failed: {message}")]
    EngineFailure { engine: String, message: String },

    #[error("Engine {engine} timed out after {seconds}s")]
    Timeout { engine: String, seconds: u64 },

    #[error("{0}")]
    AggregateFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("AWS error: {0}")]
    AwsError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl HubError {
    /// HTTP status reported at the server boundary. Caller input problems are
    /// 400, everything that went wrong while generating is 500.
    pub fn http_status(&self) -> u16 {
        match self {
            HubError::InvalidRequest(_)
            | HubError::InvalidSize(_)
            | HubError::MissingParameter(_)
            | HubError::EngineNotFound(_) => 400,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        HubError::RequestError(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
