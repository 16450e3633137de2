use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http status {status} from {url}")]
    Http { status: u16, url: String },

    #[error("venue api error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("other: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        ConnectorError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::Parse(e.to_string())
    }
}

impl ConnectorError {
    /// Venues answer an unknown market with 400 or 404; that means "not listed", not "down".
    pub fn is_not_listed(&self) -> bool {
        match self {
            ConnectorError::Http { status, .. } => *status == 400 || *status == 404,
            ConnectorError::NotFound(_) => true,
            _ => false,
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
