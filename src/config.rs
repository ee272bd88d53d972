//! Engine configuration system
//!
//! Loads the engine settings and the declarative sequence definitions from
//! TOML. Structural validation happens here; resolving mediator tags against
//! the registry happens when the engine builds its sequence graph.

use crate::element::ConfigElement;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub engine: EngineSection,
    #[serde(default, rename = "sequence")]
    pub sequences: Vec<SequenceConfig>,
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// Engine identifier (must match [a-zA-Z0-9._-]+)
    pub name: String,
    /// Root sequence used when a message names no entry point
    #[serde(default = "default_entry_sequence")]
    pub entry_sequence: String,
    /// Process-wide fault handler, consulted after every sequence-level handler
    pub fault_sequence: Option<String>,
    /// Control transfers allowed per message before LoopLimitExceeded
    #[serde(default = "default_max_reinjections")]
    pub max_reinjections: u32,
    /// Maximum nested frames on a mediation stack
    #[serde(default = "default_max_stack_depth")]
    pub max_stack_depth: usize,
    /// Faults a single message may recover from before the next one is terminal
    #[serde(default = "default_max_fault_recoveries")]
    pub max_fault_recoveries: u32,
    /// Reject unknown mediator attributes instead of ignoring them
    #[serde(default)]
    pub strict_validation: bool,
    /// Audit flag inherited by mediators that do not set `trace`
    #[serde(default)]
    pub trace_default: bool,
    /// Optional deadline for processing a single message
    pub processing_timeout_ms: Option<u64>,
    /// Longest a single audit write may hold up the pipeline
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
    #[serde(default)]
    pub loopback: LoopbackSection,
}

fn default_entry_sequence() -> String {
    "main".to_string()
}

fn default_max_reinjections() -> u32 {
    8
}

fn default_max_stack_depth() -> usize {
    32
}

fn default_max_fault_recoveries() -> u32 {
    8
}

fn default_audit_timeout_ms() -> u64 {
    250
}

/// Re-entry policy applied by control-transfer mediators
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoopbackSection {
    #[serde(default)]
    pub direction: DirectionPolicy,
    /// Drop accumulated message properties on re-entry
    #[serde(default)]
    pub clear_properties: bool,
}

/// What happens to a message's direction flag on re-entry
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirectionPolicy {
    #[default]
    Preserve,
    Request,
    Response,
}

/// A named sequence of mediator fragments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceConfig {
    pub name: String,
    /// Fault-handler sequence registered while this sequence is on the stack
    pub on_error: Option<String>,
    #[serde(default, rename = "mediator")]
    pub mediators: Vec<ConfigElement>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid engine name format: {0}")]
    InvalidEngineName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Duplicate sequence name: {0}")]
    DuplicateSequence(String),
    #[error("Sequence '{name}' referenced by {referenced_by} is not defined")]
    UnknownSequence { name: String, referenced_by: String },
    #[error("Entry sequence '{0}' has no mediators")]
    EmptyEntrySequence(String),
    #[error("Malformed tag: '{0}'")]
    InvalidTag(String),
    #[error("Factory already registered for tag {0}")]
    DuplicateFactory(String),
    #[error("<{tag}> does not accept attribute '{attribute}'")]
    UnexpectedAttribute { tag: String, attribute: String },
    #[error("<{tag}> does not accept child element <{child}>")]
    UnexpectedChild { tag: String, child: String },
    #[error("<{tag}> requires attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },
    #[error("<{tag}> attribute '{attribute}' is invalid: {reason}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        reason: String,
    },
}

impl EngineConfig {
    /// Load configuration from a TOML file and validate its structure
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation that does not need the mediator registry
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine_name(&self.engine.name)?;

        if self.engine.max_reinjections == 0 {
            return Err(ConfigError::InvalidConfig(
                "engine.max_reinjections must be at least 1".to_string(),
            ));
        }
        if self.engine.max_stack_depth == 0 {
            return Err(ConfigError::InvalidConfig(
                "engine.max_stack_depth must be at least 1".to_string(),
            ));
        }
        if self.engine.processing_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "engine.processing_timeout_ms must be positive".to_string(),
            ));
        }
        if self.engine.audit_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "engine.audit_timeout_ms must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for sequence in &self.sequences {
            if sequence.name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "sequence name must not be empty".to_string(),
                ));
            }
            if !names.insert(sequence.name.as_str()) {
                return Err(ConfigError::DuplicateSequence(sequence.name.clone()));
            }
        }

        let entry = self
            .sequence(&self.engine.entry_sequence)
            .ok_or_else(|| ConfigError::UnknownSequence {
                name: self.engine.entry_sequence.clone(),
                referenced_by: "engine.entry_sequence".to_string(),
            })?;
        if entry.mediators.is_empty() {
            return Err(ConfigError::EmptyEntrySequence(entry.name.clone()));
        }

        if let Some(fault) = &self.engine.fault_sequence {
            self.require_sequence(fault, "engine.fault_sequence")?;
        }
        for sequence in &self.sequences {
            if let Some(handler) = &sequence.on_error {
                self.require_sequence(handler, &format!("sequence '{}'", sequence.name))?;
            }
        }

        Ok(())
    }

    /// Look up a sequence definition by name
    pub fn sequence(&self, name: &str) -> Option<&SequenceConfig> {
        self.sequences.iter().find(|s| s.name == name)
    }

    fn require_sequence(&self, name: &str, referenced_by: &str) -> Result<(), ConfigError> {
        if self.sequence(name).is_none() {
            return Err(ConfigError::UnknownSequence {
                name: name.to_string(),
                referenced_by: referenced_by.to_string(),
            });
        }
        Ok(())
    }

    /// Create a minimal configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[engine]
name = "test-engine"
entry_sequence = "main"
max_reinjections = 2

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "log"
attributes = { message = "hello" }
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

/// Validate engine name format
fn validate_engine_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if name.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidEngineName(format!(
            "Engine name '{name}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
