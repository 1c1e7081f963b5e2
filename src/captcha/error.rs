//! Errors from the captcha solving collaborator.
//!
//! An image that simply cannot be read is not an error: solvers return an
//! empty string for it. These variants cover faults of the solver itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    /// The solver could not be brought up (model load, health check).
    #[error("captcha solver failed to initialize: {0}")]
    Initialization(String),

    /// The solving service answered with an unexpected status.
    #[error("captcha service error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// Network failure talking to the solving service.
    #[error("captcha transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
