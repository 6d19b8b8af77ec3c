//! AMF error types

use ogs_core::IdError;
use ogs_crypt::CryptError;
use thiserror::Error;

use crate::gmm_sm::GmmState;
use crate::types::GutiError;

/// AMF error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    /// Malformed identity, digit or length; nothing was mutated
    #[error("validation error: {0}")]
    Validation(#[from] GutiError),

    /// ID space exhausted; surfaced to the caller, never retried internally
    #[error("identity space exhausted: {0}")]
    Exhausted(String),

    /// The caller's cancel token fired during an allocation
    #[error("allocation cancelled")]
    Cancelled,

    /// KDF or key decode failure; prior keys are intact
    #[error("crypto derivation failed: {0}")]
    CryptoDerivation(#[from] CryptError),

    /// Attach/detach called with unset arguments
    #[error("inconsistent context link: {0}")]
    Consistency(&'static str),

    /// GMM transition not allowed by the state table
    #[error("invalid GMM transition {from:?} -> {to:?}")]
    InvalidTransition { from: GmmState, to: GmmState },

    /// Operation not meaningful in the current GMM state
    #[error("operation not allowed in GMM state {0:?}")]
    InvalidState(GmmState),

    /// A registration is already in flight for this UE
    #[error("registration already in progress")]
    RegistrationInProgress,

    /// Security context does not allow this step
    #[error("security context is not valid")]
    SecurityContextInvalid,

    /// Lookup failed
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Transport refused a message
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<IdError> for AmfError {
    fn from(err: IdError) -> Self {
        match err {
            IdError::Exhausted { .. } => AmfError::Exhausted(err.to_string()),
            IdError::InvalidRange { .. } => AmfError::Consistency("invalid ID range"),
        }
    }
}

/// AMF result type
pub type AmfResult<T> = Result<T, AmfError>;
