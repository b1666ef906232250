//! Errors.

use crate::fiber::FiberId;
use thiserror::Error;

/// Errors returned by the public reconciler API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The fiber isn’t part of the committed tree (anymore).
    #[error("no such fiber: {0:?}")]
    UnknownFiber(FiberId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
