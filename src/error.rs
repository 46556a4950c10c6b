use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    // API errors
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    // LAPI errors
    #[error("invalid LAPI configuration: {0}")]
    InvalidLapiConfig(String),

    #[error("LAPI request failed: {0}")]
    LapiRequest(#[from] reqwest::Error),

    #[error("{context}: {status} {body}")]
    LapiStatus {
        context: String,
        status: u16,
        body: String,
    },

    #[error("watcher credentials (machine_id + machine_password) are required for this operation")]
    WatcherCredentialsMissing,

    #[error("watcher login failed: {status} {body}")]
    WatcherLogin { status: u16, body: String },

    #[error("decision {0} was not found in LAPI (nbDeleted=0)")]
    DecisionNotFound(i64),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Storage errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // Config errors
    #[error("configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) | Self::DecisionNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotConfigured(_) | Self::WatcherCredentialsMissing => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::LapiRequest(_) | Self::LapiStatus { .. } | Self::WatcherLogin { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
