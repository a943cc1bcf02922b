use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Repository already exists: {name}")]
    RepoAlreadyExists { name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimitExceeded { reset_at: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<octocrab::Error> for GitHubError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code.as_u16();
                if source.message.to_lowercase().contains("rate limit") {
                    GitHubError::RateLimitExceeded {
                        reset_at: "unknown".to_string(),
                    }
                } else if status == 401 {
                    GitHubError::Authentication(source.message.clone())
                } else if status == 404 {
                    GitHubError::NotFound(source.message.clone())
                } else {
                    GitHubError::Api(format!("{} ({})", source.message, status))
                }
            }
            octocrab::Error::Serde { .. } | octocrab::Error::Json { .. } => {
                GitHubError::Api(err.to_string())
            }
            _ => GitHubError::Network(err.to_string()),
        }
    }
}

/// HTTP status of a GitHub API error, if the request reached GitHub.
pub(crate) fn status_of(err: &octocrab::Error) -> Option<u16> {
    match err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

/// GitHub answers 422 with "name already exists on this account" in `errors`.
pub(crate) fn is_already_exists(err: &octocrab::Error) -> bool {
    match err {
        octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 422 => {
            let details = source
                .errors
                .as_ref()
                .map(|errors| format!("{:?}", errors))
                .unwrap_or_default();
            source.message.to_lowercase().contains("already exists")
                || details.to_lowercase().contains("already exists")
        }
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;
