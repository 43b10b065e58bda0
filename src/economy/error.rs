use thiserror::Error;

/// Recoverable economy failures. State is untouched whenever one is returned.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EconomyError {
    #[error("insufficient balance: need {cost}, have {balance}")]
    InsufficientBalance { cost: f64, balance: f64 },

    #[error("invalid generator type: {0}")]
    InvalidGeneratorType(usize),

    #[error("nothing to claim (pending {pending})")]
    NothingToClaim { pending: f64 },
}
