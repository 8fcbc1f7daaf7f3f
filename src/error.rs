//! Error types for the engine and its collaborators.
//!
//! Matching itself never fails: cancels of unknown orders, self-trade skips
//! and discarded market remainders are ordinary outcomes reflected in the log
//! lines. Everything here is fatal to the owning process.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// An order kind tag outside of buy/sell/cancel/flush
    #[error("unrecognized order kind: {0}")]
    UnknownOrderKind(String),

    /// A malformed record in a scenario fixture
    #[error("fixture line {line}: {reason}")]
    Fixture { line: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing to the durable sink failed
    #[error("log sink error: {0}")]
    Sink(#[source] std::io::Error),

    /// A worker thread panicked before it could report
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::Fixture {
            line: 3,
            reason: "expected 7 fields".into(),
        };
        assert_eq!(err.to_string(), "fixture line 3: expected 7 fields");
        assert_eq!(
            EngineError::ThreadPanicked("publish").to_string(),
            "publish thread panicked"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
