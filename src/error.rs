use thiserror::Error;

/// Broad classification of an [`Error`].
///
/// The client never retries, so the class is informational: it tells the
/// caller whether the failure came from the wire, from decoding what the
/// server sent, or from its own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, HTTP status, or a stream that died before its result.
    Transport,
    /// The server sent bytes the client could not make sense of.
    Decode,
    /// The client was misconfigured before any request went out.
    Config,
}

/// Unified error type for the client.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing API key (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Server error (5xx status codes).
    #[error("server error ({0})")]
    Server(u16),

    /// Non-success HTTP response with a server-supplied message.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Request or connection timeout.
    #[error("timeout")]
    Timeout,

    /// HTTP/network error.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Stream closed before a result event arrived.
    #[error("stream interrupted before result")]
    Interrupted,

    /// The server reported an inference failure mid-stream.
    #[error("inference failed: {0}")]
    Inference(String),

    /// JSON or SSE parsing error.
    #[error("parse: {0}")]
    Parse(String),

    /// Event carried a `msg_type` the protocol does not define.
    #[error("unknown msg_type: {0}")]
    UnknownMsgType(String),

    /// Template does not contain exactly one `{prompt}` placeholder.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized
            | Error::Server(_)
            | Error::Api { .. }
            | Error::Timeout
            | Error::Http(_)
            | Error::Interrupted
            | Error::Inference(_) => ErrorKind::Transport,
            Error::Parse(_) | Error::UnknownMsgType(_) => ErrorKind::Decode,
            Error::InvalidTemplate(_) | Error::Config(_) => ErrorKind::Config,
        }
    }

    /// True if the failure came from the wire rather than from decoding.
    #[inline]
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Create an API error from status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
