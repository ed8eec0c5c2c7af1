/// Ways a well-formed frame can still fail to answer the outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    InvalidProtocolId,
    InvalidTransactionId,
    InvalidUnitId,
    UnexpectedFunction,
}

impl std::fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidProtocolId => write!(f, "Invalid protocol ID"),
            Self::InvalidTransactionId => write!(f, "Invalid transaction ID"),
            Self::InvalidUnitId => write!(f, "Invalid unit ID"),
            Self::UnexpectedFunction => write!(f, "Unexpected function code"),
        }
    }
}
