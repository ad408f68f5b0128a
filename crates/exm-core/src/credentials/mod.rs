//! Credential gate: secrets collected before any platform resource exists.
//!
//! The gate is two independent request/response operations. Either one
//! failing stops startup before the platform controller is touched.

use std::fmt;

use crate::arguments::Credentials;

/// Which secret was being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ApiKey,
    BearerToken,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialKind::ApiKey => "VCC API key",
            CredentialKind::BearerToken => "OAuth 2.0 bearer token",
        })
    }
}

/// Errors from acquiring a single credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no value was entered")]
    Empty,

    #[error("input was cancelled")]
    Cancelled,

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the two platform secrets.
pub trait CredentialGate: Send {
    /// Acquire the platform API key.
    fn acquire_api_key(&mut self) -> Result<String, CredentialError>;

    /// Acquire the bearer token. Interactive implementations must not echo it.
    fn acquire_bearer_token(&mut self) -> Result<String, CredentialError>;
}

// Compile-time assertion: CredentialGate must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn CredentialGate) {}
};

/// Run both operations in order, stopping at the first failure.
///
/// Values that are empty after trimming surrounding whitespace count as
/// [`CredentialError::Empty`].
pub fn acquire(
    gate: &mut dyn CredentialGate,
) -> Result<Credentials, (CredentialKind, CredentialError)> {
    let api_key = gate
        .acquire_api_key()
        .and_then(non_empty)
        .map_err(|e| (CredentialKind::ApiKey, e))?;
    let bearer_token = gate
        .acquire_bearer_token()
        .and_then(non_empty)
        .map_err(|e| (CredentialKind::BearerToken, e))?;
    Ok(Credentials::new(api_key, bearer_token))
}

fn non_empty(value: String) -> Result<String, CredentialError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::Empty);
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}
