//! Sync error types.

use aical_core::UserId;
use aical_gateway::GatewayError;
use aical_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a reconciliation call or a whole sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The provider could not be reached or answered with an error.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A user's refresh credential could not be exchanged.
    #[error("credential exchange failed for user {user_id}: {source}")]
    Credential {
        user_id: UserId,
        #[source]
        source: GatewayError,
    },

    /// A store operation failed; only its own transaction was rolled back.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The cycle ran past its deadline.
    #[error("sync deadline exceeded")]
    DeadlineExceeded,

    /// The cycle was cancelled from outside.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a credential error.
    pub fn credential(user_id: UserId, source: GatewayError) -> Self {
        Self::Credential { user_id, source }
    }

    /// Short name used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gateway(_) => "gateway",
            Self::Credential { .. } => "credential",
            Self::Persistence(_) => "persistence",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_error_names_user() {
        let user_id = UserId::new();
        let err = SyncError::credential(user_id, GatewayError::authentication("revoked"));
        assert!(err.to_string().contains(&user_id.to_string()));
        assert_eq!(err.kind(), "credential");
    }

    #[test]
    fn conversions() {
        let err: SyncError = StoreError::backend("disk").into();
        assert_eq!(err.kind(), "persistence");
        let err: SyncError = GatewayError::network("dns").into();
        assert_eq!(err.kind(), "gateway");
    }
}
