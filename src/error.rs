//! Error taxonomy for a canvassing submission.

use thiserror::Error;

/// Failure of a single submission.
///
/// Input errors block only the current submission; `UpstreamUnavailable` is
/// retryable. An empty result set is not an error.
#[derive(Debug, Error)]
pub enum CanvassError {
    #[error("Please enter a street address.")]
    EmptyStreet,

    #[error("Please enter a city.")]
    EmptyCity,

    #[error("Please input a 5 digit numeric zip code.")]
    InvalidZip,

    #[error("Address not found. Please check address and/or enter another.")]
    AddressNotFound,

    #[error("{service} is unavailable right now, please try again: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },
}

impl CanvassError {
    pub fn upstream(service: &'static str, err: &anyhow::Error) -> Self {
        CanvassError::UpstreamUnavailable {
            service,
            reason: format!("{:#}", err),
        }
    }

    /// True for errors caused by the submitted form rather than a backend
    pub fn is_input_error(&self) -> bool {
        !matches!(self, CanvassError::UpstreamUnavailable { .. })
    }
}
