//! Error types for the portal subsystem

use thiserror::Error;

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

/// How the block pipeline reacts to an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Log it, leave state as it was before the instruction, continue the block.
    SkipInstruction,
    /// The whole block cannot be processed.
    AbortBlock,
}

/// Errors that can occur while producing or applying portal instructions
#[derive(Debug, Error)]
pub enum PortalError {
    /// State store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored entity could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Loaded state violates an accounting invariant
    #[error("Corrupted state: {reason}")]
    CorruptedState {
        /// What was found
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Instruction tuple or payload cannot be parsed
    #[error("Malformed instruction: {0}")]
    MalformedInstruction(String),

    /// Status string not valid for the instruction's meta type
    #[error("Unknown status {status:?} for meta type {meta_type}")]
    UnknownStatus {
        /// Meta type id of the instruction
        meta_type: u32,
        /// Offending status string
        status: String,
    },

    /// Action routed to a processor that does not handle its payload
    #[error("Unexpected payload, expected {expected}")]
    UnexpectedPayload {
        /// Payload kind the processor handles
        expected: &'static str,
    },

    /// Custodian missing from the pool
    #[error("Custodian not found: {0}")]
    CustodianNotFound(String),

    /// Waiting porting request missing
    #[error("Porting request not found: {0}")]
    PortingRequestNotFound(String),

    /// Waiting or matched redeem request missing
    #[error("Redeem request not found: {0}")]
    RedeemRequestNotFound(String),

    /// Unique id already used
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Portal token is not supported
    #[error("Unsupported portal token: {0}")]
    UnsupportedToken(String),

    /// Collateral token is not supported
    #[error("Unsupported collateral token: {0}")]
    UnsupportedCollateral(String),

    /// No usable exchange rate for a token
    #[error("Exchange rate not found for token {0}")]
    ExchangeRateNotFound(String),

    /// Fee below the required minimum
    #[error("Fee too low: got {fee}, minimum {min_fee}")]
    FeeTooLow {
        /// Submitted fee
        fee: u64,
        /// Required minimum
        min_fee: u64,
    },

    /// Custodian pool cannot cover a request
    #[error("Not enough custodians for {amount} of {token}")]
    NotEnoughCustodians {
        /// Portal token id
        token: String,
        /// Amount that could not be covered
        amount: u64,
    },

    /// Custodian has no remote address for a portal token
    #[error("Custodian {custodian} has no remote address for {token}")]
    MissingRemoteAddress {
        /// Custodian incognito address
        custodian: String,
        /// Portal token id
        token: String,
    },

    /// A balance would go negative
    #[error("Insufficient {what}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Which balance
        what: &'static str,
        /// Current balance
        available: u64,
        /// Amount requested
        requested: u64,
    },

    /// Amount is zero or does not match the request
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// External proof failed verification or does not match the request
    #[error("Proof rejected: {0}")]
    ProofRejected(String),

    /// External transaction was already credited
    #[error("External tx already used: {0}")]
    ExternalTxAlreadyUsed(String),

    /// Sender is not allowed to submit this action
    #[error("Unauthorized sender: {0}")]
    Unauthorized(String),

    /// Liquidation pool holds nothing for the token
    #[error("Liquidation pool is empty for token {0}")]
    LiquidationPoolEmpty(String),

    /// u64 overflow in an accounting operation
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// Division by a zero quantity
    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),

    /// Request lifecycle transition not allowed
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state
        from: String,
        /// Attempted state
        to: String,
    },
}

impl PortalError {
    /// Classify the error for the block pipeline
    pub fn severity(&self) -> Severity {
        match self {
            Self::Storage(_)
            | Self::Serialization(_)
            | Self::CorruptedState { .. }
            | Self::InvalidConfig(_) => Severity::AbortBlock,
            _ => Severity::SkipInstruction,
        }
    }

    /// Check if error invalidates the whole block
    pub fn is_block_fatal(&self) -> bool {
        self.severity() == Severity::AbortBlock
    }

    /// Check if error only drops the current instruction
    pub fn is_skippable(&self) -> bool {
        self.severity() == Severity::SkipInstruction
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_abort_block() {
        assert!(PortalError::Storage("disk".into()).is_block_fatal());
        assert!(PortalError::Serialization("bad json".into()).is_block_fatal());
        assert!(PortalError::CorruptedState {
            reason: "free > total".into()
        }
        .is_block_fatal());
    }

    #[test]
    fn test_validation_errors_are_skippable() {
        assert!(PortalError::CustodianNotFound("abc".into()).is_skippable());
        assert!(PortalError::UnknownStatus {
            meta_type: 101,
            status: "??".into()
        }
        .is_skippable());
        assert!(PortalError::FeeTooLow { fee: 1, min_fee: 2 }.is_skippable());
    }

    #[test]
    fn test_error_messages() {
        let err = PortalError::InsufficientBalance {
            what: "free collateral",
            available: 10,
            requested: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("free collateral"));
        assert!(msg.contains("20"));
    }
}
