//! Error types shared by the relay and agent binaries.

/// Result type alias used throughout tunnelforge.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tunnelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed frame: {message}")]
    MalformedFrame { message: String },

    #[error("unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    #[error("request timed out")]
    Timeout,

    #[error("invalid upgrade: {message}")]
    InvalidUpgrade { message: String },

    #[error("local service unreachable: {0}")]
    LocalServiceUnreachable(String),

    #[error("routing error: {message}")]
    Routing { message: String },

    #[error("proxy error: {message}")]
    Proxy { message: String },

    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("generic error: {0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Generic(message)
    }
}

impl Error {
    /// Create a malformed-frame error.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Create an invalid-upgrade error.
    pub fn invalid_upgrade<S: Into<String>>(message: S) -> Self {
        Self::InvalidUpgrade {
            message: message.into(),
        }
    }

    /// Create a routing error.
    pub fn routing<S: Into<String>>(message: S) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Create a proxy error.
    pub fn proxy<S: Into<String>>(message: S) -> Self {
        Self::Proxy {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }
}
