// ABOUTME: Error taxonomy surfaced by the adapter to its callers.
// ABOUTME: Resolution, authentication and transport failures.

use thiserror::Error;

/// Errors callers of the adapter are expected to match on
#[derive(Debug, Error)]
pub enum RelayError {
    /// No channel, group or user carries this display name
    #[error("Destination not resolvable: {0}")]
    DestinationNotFound(String),

    /// Credentials were rejected; not retried
    #[error("Invalid credentials: {0}")]
    AuthInvalid(String),

    /// A transport call was made before `authenticate` succeeded
    #[error("Transport is not authenticated")]
    NotAuthenticated,

    /// Transport failure, propagated unchanged
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
