use thiserror::Error;

/// Failures surfaced by the core gateway types.
///
/// Overload drops (full per-connection queues) are deliberately not a
/// variant: they are counted and logged, never propagated.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The backing key-value store rejected an operation.
    #[error("key-value store failure: {0}")]
    Store(String),

    /// The pub/sub broker rejected an operation or went away.
    #[error("broker failure: {0}")]
    Broker(String),

    /// The token is absent from the store (TTL elapsed or never issued).
    #[error("token expired")]
    Expired,

    /// A payload or identity did not parse.
    #[error("malformed {0}")]
    Malformed(String),

    /// No live entity is registered for the token.
    #[error("no entity for token {0}")]
    NotFound(String),

    /// The client clock is outside the accepted skew window.
    #[error("client clock out of sync by {0} seconds")]
    ClockSkew(i64),
}

impl CoreError {
    /// Shorthand for a `Malformed` error with context.
    pub fn malformed(what: impl Into<String>) -> Self {
        CoreError::Malformed(what.into())
    }
}
