use std::time::Duration;

/// Errors that can occur while bridging requests to the Claude CLI.
///
/// Errors are organized by category:
/// - Configuration errors: detected before any stream is opened
/// - Authentication errors: translated from the CLI's synthetic error output
/// - Transport errors: failures talking to the CLI process
/// - Stream errors: misuse of stream ids
/// - Runtime errors: timeouts and cancellation
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors
    // -------------------------------------------------------------------------
    /// Claude CLI executable could not be located.
    #[error("claude CLI not found (searched: {searched})")]
    CliNotFound { searched: String },

    /// Invalid configuration provided to builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Authentication errors
    // -------------------------------------------------------------------------
    /// The CLI reported that it has no usable credentials.
    ///
    /// Raised in place of the CLI's synthetic "Invalid API key" output.
    #[error("authentication required: {detail}")]
    AuthenticationRequired { detail: String },

    // -------------------------------------------------------------------------
    // Transport errors
    // -------------------------------------------------------------------------
    /// Failed to spawn the claude subprocess.
    #[error("failed to spawn claude process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    /// IO error communicating with the claude subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// Failed to parse JSON from CLI output.
    #[error("failed to parse JSON: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The CLI reported an error.
    #[error("CLI error: {message}")]
    CliError { message: String },

    /// The CLI exited before sending a result message.
    #[error("stream closed unexpectedly")]
    StreamClosed,

    // -------------------------------------------------------------------------
    // Stream errors
    // -------------------------------------------------------------------------
    /// No stream is registered under this id (never opened or already drained).
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// The stream already has a consumer.
    #[error("stream {0} is already being consumed")]
    StreamAlreadyConsumed(String),

    /// A stream with this id is already open.
    #[error("stream {0} already exists")]
    StreamExists(String),

    // -------------------------------------------------------------------------
    // Runtime errors
    // -------------------------------------------------------------------------
    /// Request exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Request was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

/// A specialized Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a JSON parse error with context.
    pub fn json_parse(source: serde_json::Error, raw: &str) -> Self {
        Self::JsonParse {
            message: format!(
                "at position {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Check if this error is related to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::AuthenticationRequired { .. })
    }

    /// Check if this error is a configuration problem the user has to fix.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::CliNotFound { .. } | Error::InvalidConfig(_))
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Io(_) | Error::StreamClosed)
    }

    /// Text suitable for showing to a person.
    ///
    /// Configuration and authentication failures are rewritten into
    /// instructions; everything else falls back to the `Display` text.
    pub fn user_message(&self) -> String {
        match self {
            Error::CliNotFound { searched } => format!(
                "Claude Code could not be found (looked for {searched}). \
                 Install it with `npm install -g @anthropic-ai/claude-code` \
                 or set the path to the executable in the settings."
            ),
            Error::InvalidConfig(reason) => {
                format!("The Claude Code settings are invalid: {reason}.")
            }
            Error::AuthenticationRequired { .. } => {
                "Claude Code is not authenticated. Run `claude` and use /login, \
                 or set an API key in the settings."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse {
            message: err.to_string(),
            source: err,
        }
    }
}
