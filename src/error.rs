// Typed errors with thiserror. Surface meaningful messages to JS.

use std::fmt;

use thiserror::Error;

use crate::types::{EffectId, Locator};

/// Lifecycle step an effect failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => f.write_str("start"),
            Phase::Stop => f.write_str("stop"),
        }
    }
}

/// Controller and registry error types.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown effect: {0}")]
    UnknownEffect(EffectId),

    #[error("Failed to load {locator}: {reason}")]
    ResourceLoad { locator: Locator, reason: String },

    #[error("Effect \"{effect}\" failed during {phase}: {message}")]
    Effect {
        effect: EffectId,
        phase: Phase,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EmbedError {
    fn from(err: serde_json::Error) -> Self {
        EmbedError::Serialization(err.to_string())
    }
}

/// Failure reported by effect code from `start`, `stop` or a runtime handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EffectError(String);

impl EffectError {
    pub fn new(message: impl Into<String>) -> Self {
        EffectError(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}
