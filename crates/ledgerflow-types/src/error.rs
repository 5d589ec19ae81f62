//! Error types for LedgerFlow
//!
//! Every operation returns either a value or one of these errors. Nothing is
//! thrown across an await point.

use thiserror::Error;

/// Result type for LedgerFlow operations
pub type Result<T> = std::result::Result<T, LedgerFlowError>;

/// LedgerFlow error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerFlowError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// A raw amount failed range or precision checks
    #[error("Invalid {currency} amount: {reason}")]
    Validation { currency: String, reason: String },

    /// Sender and recipient are the same wallet
    #[error("Self payments are not allowed")]
    SelfPayment,

    /// Arithmetic on amounts overflowed
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    // ========================================================================
    // Builder Errors
    // ========================================================================

    /// The payment flow builder was driven into a state it cannot complete
    #[error("Invalid payment flow builder state: {reason}")]
    InvalidBuilderState { reason: String },

    // ========================================================================
    // Price Errors
    // ========================================================================

    /// The price conversion service failed
    #[error("Dealer price service error: {message}")]
    DealerPriceService { message: String },

    /// A price ratio was requested from a pair with a zero side
    #[error("Price ratio cannot be derived from a zero {side} amount")]
    ZeroAmountPriceRatio { side: String },

    // ========================================================================
    // Ledger Errors
    // ========================================================================

    /// The ledger has no pending transaction for this payment
    #[error("Could not find pending transaction for payment {payment_hash}")]
    CouldNotFindTransaction { payment_hash: String },

    /// A ledger entry is missing data the ledger guarantees elsewhere
    #[error("Unknown ledger error: {message}")]
    UnknownLedger { message: String },

    /// Settlement was requested but nothing is pending for the hash
    #[error("No pending transaction to settle for payment {payment_hash}")]
    NoTransactionToSettle { payment_hash: String },

    /// Reverting a failed payment's journal did not succeed
    #[error("Failed to revert journal {journal_id} for payment {payment_hash}: {reason}")]
    LedgerRevertFailed {
        journal_id: String,
        payment_hash: String,
        reason: String,
    },

    /// The ledger backend is unreachable or rejected the operation
    #[error("Ledger service error: {message}")]
    LedgerService { message: String },

    // ========================================================================
    // Lock Errors
    // ========================================================================

    /// The lock could not be obtained before the deadline
    #[error("Timed out acquiring lock {key} after {waited_ms}ms")]
    LockAcquisitionTimeout { key: String, waited_ms: u64 },

    /// The lock backend is unreachable
    #[error("Lock service error: {message}")]
    LockService { message: String },

    // ========================================================================
    // Settlement Network Errors
    // ========================================================================

    /// The settlement network returned something the ledger cannot trust
    #[error("Unknown lightning service error: {message}")]
    UnknownLightningService { message: String },

    /// The settlement network could not be queried
    #[error("Payment lookup failed for {payment_hash}: {message}")]
    PaymentLookupFailed { payment_hash: String, message: String },

    /// The settlement network has no record of the payment
    #[error("Payment {payment_hash} not found on settlement network")]
    PaymentNotFound { payment_hash: String },

    // ========================================================================
    // Repository Errors
    // ========================================================================

    /// Wallet not found
    #[error("Wallet {wallet_id} not found")]
    WalletNotFound { wallet_id: String },

    /// No cached payment flow for this wallet/hash (absent or expired)
    #[error("Payment flow state not found for payment {payment_hash}")]
    PaymentFlowStateNotFound { payment_hash: String },

    /// A cached payment flow exists but does not match the ledger entry
    #[error("Payment flow state for {payment_hash} does not match: {reason}")]
    PaymentFlowStateMismatch { payment_hash: String, reason: String },

    /// Fee reimbursement could not be recorded
    #[error("Fee reimbursement failed for journal {journal_id}: {reason}")]
    FeeReimbursementFailed { journal_id: String, reason: String },

    // ========================================================================
    // Data Integrity Errors
    // ========================================================================

    /// A ledger record violates an invariant; not retried
    #[error("Inconsistent data: {message}")]
    InconsistentData { message: String },
}

impl LedgerFlowError {
    /// Create a validation error for a currency
    pub fn validation(currency: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            currency: currency.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid builder state error
    pub fn invalid_builder_state(reason: impl Into<String>) -> Self {
        Self::InvalidBuilderState {
            reason: reason.into(),
        }
    }

    /// Create a dealer price service error
    pub fn dealer_price(message: impl Into<String>) -> Self {
        Self::DealerPriceService {
            message: message.into(),
        }
    }

    /// Create an inconsistent data error
    pub fn inconsistent_data(message: impl Into<String>) -> Self {
        Self::InconsistentData {
            message: message.into(),
        }
    }

    /// Create a ledger service error
    pub fn ledger_service(message: impl Into<String>) -> Self {
        Self::LedgerService {
            message: message.into(),
        }
    }

    /// Lookup/availability failures. The payment stays pending and the next
    /// scheduled pass retries it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DealerPriceService { .. }
                | Self::LedgerService { .. }
                | Self::LockAcquisitionTimeout { .. }
                | Self::LockService { .. }
                | Self::PaymentLookupFailed { .. }
        )
    }

    /// Defects in stored data that no amount of retrying will fix
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::InconsistentData { .. })
    }

    /// Get an error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::SelfPayment => "SELF_PAYMENT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::InvalidBuilderState { .. } => "INVALID_BUILDER_STATE",
            Self::DealerPriceService { .. } => "DEALER_PRICE_SERVICE",
            Self::ZeroAmountPriceRatio { .. } => "ZERO_AMOUNT_PRICE_RATIO",
            Self::CouldNotFindTransaction { .. } => "COULD_NOT_FIND_TRANSACTION",
            Self::UnknownLedger { .. } => "UNKNOWN_LEDGER",
            Self::NoTransactionToSettle { .. } => "NO_TRANSACTION_TO_SETTLE",
            Self::LedgerRevertFailed { .. } => "LEDGER_REVERT_FAILED",
            Self::LedgerService { .. } => "LEDGER_SERVICE",
            Self::LockAcquisitionTimeout { .. } => "LOCK_ACQUISITION_TIMEOUT",
            Self::LockService { .. } => "LOCK_SERVICE",
            Self::UnknownLightningService { .. } => "UNKNOWN_LIGHTNING_SERVICE",
            Self::PaymentLookupFailed { .. } => "PAYMENT_LOOKUP_FAILED",
            Self::PaymentNotFound { .. } => "PAYMENT_NOT_FOUND",
            Self::WalletNotFound { .. } => "WALLET_NOT_FOUND",
            Self::PaymentFlowStateNotFound { .. } => "PAYMENT_FLOW_STATE_NOT_FOUND",
            Self::PaymentFlowStateMismatch { .. } => "PAYMENT_FLOW_STATE_MISMATCH",
            Self::FeeReimbursementFailed { .. } => "FEE_REIMBURSEMENT_FAILED",
            Self::InconsistentData { .. } => "INCONSISTENT_DATA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = LedgerFlowError::WalletNotFound {
            wallet_id: "test".to_string(),
        };
        assert_eq!(err.error_code(), "WALLET_NOT_FOUND");
        assert_eq!(LedgerFlowError::SelfPayment.error_code(), "SELF_PAYMENT");
    }

    #[test]
    fn test_transient_errors() {
        let lookup = LedgerFlowError::PaymentLookupFailed {
            payment_hash: "abc".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(lookup.is_transient());
        assert!(!lookup.is_data_integrity());

        let defect = LedgerFlowError::inconsistent_data("pubkey missing");
        assert!(defect.is_data_integrity());
        assert!(!defect.is_transient());
    }
}
