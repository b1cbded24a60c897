//! Configuration errors
//!
//! Only configuration can fail. Underruns and short ring reads are normal
//! operating conditions and are reported through frame counts instead.

use thiserror::Error;

/// Error returned when a source format, host rate or option set cannot be
/// turned into a working resampler configuration.
///
/// A renderer whose configuration failed produces silence until a valid
/// configuration supersedes it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Unsupported audio bit depth: {0} (expected 8 or 16)")]
    UnsupportedBitDepth(u32),

    #[error("Unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannelCount(u32),

    #[error("Invalid source sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    #[error("Invalid host sample rate: {0} Hz")]
    InvalidHostSampleRate(f64),

    #[error("Invalid resampler option: {0}")]
    InvalidOption(&'static str),
}
