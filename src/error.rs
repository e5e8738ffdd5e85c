//! Error types for replybot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Generation error: {0}")]
    Gen(#[from] GenError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors. Fatal at startup — the bot refuses to
/// run with a broken configuration rather than limping along.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No text-generation provider configured (set at least one of GOOGLE_API_KEY, ANTHROPIC_API_KEY, OPENAI_API_KEY)")]
    NoProviders,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable-storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from the post source (fetch/reply collaborator).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Authentication with {service} failed: {reason}")]
    Auth { service: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error from {service}: status {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Http(e.to_string())
    }
}

/// Text-generation provider errors.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("Provider {provider} blocked the prompt: {reason}")]
    ContentBlocked { provider: String, reason: String },

    #[error("All configured providers failed to generate a response")]
    AllProvidersFailed,
}

/// Pipeline-level errors. Per-post failures are caught at the
/// post-processing boundary and turned into ledger entries; only
/// store failures propagate past the cycle.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Generation error: {0}")]
    Gen(#[from] GenError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
