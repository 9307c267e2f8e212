//! Error types for the streaming bridge.
//!
//! Every failure a run can hit ends up as a [`BridgeError`] inside
//! [`ParseOutcome::Failure`](crate::ParseOutcome). Nothing is retried and
//! nothing is swallowed.

use thiserror::Error;

/// Error raised by a consumer callback.
///
/// Kept as the `#[source]` of the [`BridgeError`] that reports it.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience type alias for Results using [`BridgeError`].
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Top-level bridge errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// The base identifier was rejected or the engine could not be seeded.
    #[error("cannot open session: {0}")]
    Initialization(String),

    /// The consumer failed while producing input bytes.
    #[error("consumer failed to produce input: {0}")]
    InputProduction(#[source] ConsumerError),

    /// The consumer failed while receiving a triple.
    #[error("consumer failed to accept triple: {0}")]
    TripleDelivery(#[source] ConsumerError),

    /// The parse engine reported a fault.
    #[error(transparent)]
    Engine(#[from] EngineFault),

    /// `run` was called before any consumer was bound.
    #[error("no consumer bound to session")]
    NoConsumer,

    /// `run` was called on a session that is not idle.
    #[error("session cannot run from state {0}")]
    InvalidState(crate::SessionState),
}

impl BridgeError {
    /// Integer code for this failure, stable across releases.
    ///
    /// `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::Engine(EngineFault::Malformed { .. }) => 1,
            BridgeError::InputProduction(_) => 2,
            BridgeError::TripleDelivery(_) => 3,
            BridgeError::Engine(EngineFault::Internal(_)) => 4,
            BridgeError::Initialization(_) => 5,
            BridgeError::NoConsumer | BridgeError::InvalidState(_) => 6,
        }
    }
}

/// Faults reported by the parse engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFault {
    /// The document is not well-formed.
    #[error("malformed input at byte {position}: {message}")]
    Malformed {
        /// Byte offset in the input stream.
        position: u64,
        /// What the tokenizer or the element stack objected to.
        message: String,
    },

    /// The engine broke its own contract.
    #[error("internal engine fault: {0}")]
    Internal(String),
}

impl EngineFault {
    /// A well-formedness fault at byte `position`.
    ///
    /// ```
    /// use rdfa_stream::EngineFault;
    ///
    /// let fault = EngineFault::malformed(3, "unexpected end tag </p>");
    /// assert_eq!(fault.to_string(), "malformed input at byte 3: unexpected end tag </p>");
    /// ```
    pub fn malformed(position: u64, message: impl Into<String>) -> Self {
        Self::Malformed {
            position,
            message: message.into(),
        }
    }

    /// A broken engine contract, such as an unknown object code.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
