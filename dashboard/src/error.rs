use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with `success: false`.
    #[error("{0}")]
    Api(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("push channel error: {0}")]
    Push(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("login to access the resources")]
    NotLoggedIn,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for DashboardError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DashboardError::Push(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
