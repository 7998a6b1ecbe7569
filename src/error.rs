//! Error kinds surfaced by the analysis and rendering core.

use thiserror::Error;

/// Failure modes of the FFT kernel, spectrogram builder, and GPU backend.
///
/// See the policy table in each call site: `Cancelled` is expected and
/// silent, `DeviceUnavailable` demotes the GPU path for the process
/// lifetime, and the rest are fatal only to the session that produced them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid FFT size {requested} (must be a power of two in [2, 65536])")]
    InvalidSize { requested: usize },

    #[error("segment too short: have {have} samples, need at least {need}")]
    InsufficientLength { have: usize, need: usize },

    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
