use thiserror::Error;

pub type Result<T, E = ToggleError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("application is required")]
    MissingApplication,
    #[error("environment is required")]
    MissingEnvironment,
    #[error("public key is required")]
    MissingPublicKey,
    #[error(
        "invalid environment format. Must be either a project environment ID \
         (starting with \"pevr_\") or a valid alternateId (1-25 characters, lowercase \
         letters, numbers, hyphens, and underscores, not containing the word \"environments\")"
    )]
    InvalidEnvironmentFormat,
    #[error("public key cannot be used as a request header")]
    InvalidPublicKey,
    #[error("targeting key is required")]
    MissingTargetingKey,
    #[error("flag not found: {0}")]
    FlagNotFound(String),
    #[error("invalid flag type for {flag}: expected {expected}, got {actual}")]
    InvalidFlagType {
        flag: String,
        expected: String,
        actual: String,
    },
    #[error("all evaluation attempts failed: {0}")]
    EvaluationFailed(#[source] anyhow::Error),
    #[error("failed to send telemetry to all endpoints: {0}")]
    TelemetryFailed(#[source] anyhow::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ToggleError {
    /// Configuration errors are fatal to provider construction and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ToggleError::MissingApplication
                | ToggleError::MissingEnvironment
                | ToggleError::MissingPublicKey
                | ToggleError::InvalidEnvironmentFormat
                | ToggleError::InvalidPublicKey
        )
    }
}
