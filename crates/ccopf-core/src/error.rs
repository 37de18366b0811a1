//! Error type for feeder construction and lookups.

use thiserror::Error;

use crate::BusId;

/// Errors raised while assembling or querying a [`Topology`](crate::Topology).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeederError {
    /// Bus/line data that is malformed in isolation (non-finite impedance, inverted limits, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The bus/line set does not form a single radial tree
    #[error("Topology error: {0}")]
    Topology(String),

    /// A bus id referenced somewhere is not part of the feeder
    #[error("Unknown bus {0}")]
    UnknownBus(BusId),
}

/// Convenience type alias for Results using FeederError.
pub type FeederResult<T> = Result<T, FeederError>;
