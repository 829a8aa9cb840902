use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Client '{client_id}' not found")]
    ClientNotFound { client_id: String },

    #[error("Client '{client_id}' is not enrolled in the loyalty program")]
    NotEnrolled { client_id: String },

    #[error("Client '{client_id}' already exists")]
    ClientExists { client_id: String },

    #[error("Unit quantity {quantity} is out of range")]
    QuantityOutOfRange { quantity: u64 },

    #[error("Invalid tier table: {0}")]
    InvalidTierTable(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoyaltyError {
    /// True when the failure came from the persistence layer.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}

/// Failures normalizing raw values at the external boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown tier '{0}'")]
    UnknownTier(String),

    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),
}

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;
