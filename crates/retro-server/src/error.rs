use retro_store::StoreError;

/// Why the room rejected an operation. Every variant becomes a single
/// `error{message}` event to the originating connection; shared state is
/// never partially mutated.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Malformed or missing fields in an inbound message.
    #[error("{0}")]
    Validation(String),

    /// A non-facilitator attempted a facilitator-only action.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// The operation is illegal in the current phase.
    #[error("{0}")]
    StateViolation(&'static str),

    /// The operation references a stale or deleted item/group/session.
    #[error("{0}")]
    NotFound(&'static str),

    /// A vote was requested with zero budget remaining.
    #[error("No votes remaining")]
    BudgetExceeded,

    /// A message arrived before a successful join on this connection.
    #[error("Not joined")]
    NotJoined,

    /// The durable store failed mid-operation.
    #[error("Internal error: {0}")]
    Store(#[from] StoreError),
}

impl RoomError {
    /// Stable snake_case tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "authorization",
            Self::StateViolation(_) => "state_violation",
            Self::NotFound(_) => "not_found",
            Self::BudgetExceeded => "budget_exceeded",
            Self::NotJoined => "not_joined",
            Self::Store(_) => "store",
        }
    }
}
