//! Error taxonomy for configuration loading and message mediation
//!
//! Configuration-time errors (`Configuration`, `UnknownMediatorKind`) abort a
//! load or reload. Everything else is a runtime fault that the engine routes
//! through the message's fault stack.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;

const MAX_FAULT_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

/// Main error type for mediation operations
#[derive(Debug, Error)]
pub enum MediationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Unknown mediator kind: {tag}")]
    UnknownMediatorKind { tag: String },

    #[error("Loop limit exceeded: reinjection count {count}, max reinjections {max}")]
    LoopLimitExceeded { count: u32, max: u32 },

    #[error("Mediation fault [{code}]: {message}")]
    Fault { code: String, message: String },

    #[error("Mediation stack depth exceeded: depth {depth}, max depth {max}")]
    StackDepthExceeded { depth: usize, max: usize },

    #[error("Sequence not found: {name}")]
    SequenceNotFound { name: String },

    #[error("Invalid entry sequence '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("Processing timed out after {elapsed_ms} ms")]
    ProcessingTimeout { elapsed_ms: u64 },
}

/// Machine-readable fault classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultCode {
    ConfigurationError,
    UnknownMediatorKind,
    LoopLimitExceeded,
    MediationFault,
    StackDepthExceeded,
    SequenceNotFound,
    InvalidEntry,
    ProcessingTimeout,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::ConfigurationError => "CONFIGURATION_ERROR",
            FaultCode::UnknownMediatorKind => "UNKNOWN_MEDIATOR_KIND",
            FaultCode::LoopLimitExceeded => "LOOP_LIMIT_EXCEEDED",
            FaultCode::MediationFault => "MEDIATION_FAULT",
            FaultCode::StackDepthExceeded => "STACK_DEPTH_EXCEEDED",
            FaultCode::SequenceNotFound => "SEQUENCE_NOT_FOUND",
            FaultCode::InvalidEntry => "INVALID_ENTRY",
            FaultCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
        }
    }
}

/// Sanitized, serializable view of a fault for a single message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaultReport {
    pub code: FaultCode,
    pub message: String,
    pub correlation_id: Uuid,
}

impl MediationError {
    /// Create a mediator-raised fault
    pub fn fault<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self::Fault {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn loop_limit_exceeded(count: u32, max: u32) -> Self {
        Self::LoopLimitExceeded { count, max }
    }

    pub fn unknown_mediator_kind<S: Into<String>>(tag: S) -> Self {
        Self::UnknownMediatorKind { tag: tag.into() }
    }

    pub fn sequence_not_found<S: Into<String>>(name: S) -> Self {
        Self::SequenceNotFound { name: name.into() }
    }

    pub fn code(&self) -> FaultCode {
        match self {
            MediationError::Configuration(_) => FaultCode::ConfigurationError,
            MediationError::UnknownMediatorKind { .. } => FaultCode::UnknownMediatorKind,
            MediationError::LoopLimitExceeded { .. } => FaultCode::LoopLimitExceeded,
            MediationError::Fault { .. } => FaultCode::MediationFault,
            MediationError::StackDepthExceeded { .. } => FaultCode::StackDepthExceeded,
            MediationError::SequenceNotFound { .. } => FaultCode::SequenceNotFound,
            MediationError::InvalidEntry { .. } => FaultCode::InvalidEntry,
            MediationError::ProcessingTimeout { .. } => FaultCode::ProcessingTimeout,
        }
    }

    /// Whether this error may be recovered by a fault-handler sequence.
    ///
    /// Configuration-time errors are never downgraded to runtime faults, and
    /// timeouts and bad entry points end processing outright.
    pub fn is_runtime_fault(&self) -> bool {
        matches!(
            self,
            MediationError::LoopLimitExceeded { .. }
                | MediationError::Fault { .. }
                | MediationError::StackDepthExceeded { .. }
                | MediationError::SequenceNotFound { .. }
        )
    }

    /// Convert to a sanitized fault report for a given message
    pub fn to_fault_report(&self, correlation_id: Uuid) -> FaultReport {
        let message = match self {
            MediationError::Fault { message, .. } => message.clone(),
            MediationError::LoopLimitExceeded { count, max } => {
                format!("Reinjection count {count} exceeds maximum {max}")
            }
            other => other.to_string(),
        };

        FaultReport {
            code: self.code(),
            message: sanitize_fault_message(&message),
            correlation_id,
        }
    }

    /// Code written to the `ERROR_CODE` message property when a fault is handled
    pub fn property_code(&self) -> String {
        match self {
            MediationError::Fault { code, .. } => code.clone(),
            other => other.code().as_str().to_string(),
        }
    }
}

/// Redact secrets and sensitive paths, then cap the message length
pub fn sanitize_fault_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_FAULT_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_FAULT_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for mediation operations
pub type MediationResult<T> = Result<T, MediationError>;
