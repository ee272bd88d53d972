//! Built sequences and the immutable sequence graph

use crate::config::{ConfigError, EngineConfig};
use crate::error::MediationError;
use crate::mediators::Mediator;
use crate::registry::{FactoryContext, MediatorRegistry};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const INLINE_SEQUENCE_NAME: &str = "<inline>";

/// Ordered list of mediators, named or anonymous
pub struct Sequence {
    name: Option<String>,
    mediators: Vec<Arc<dyn Mediator>>,
    on_error: Option<String>,
}

impl Sequence {
    pub fn named<S: Into<String>>(
        name: S,
        mediators: Vec<Arc<dyn Mediator>>,
        on_error: Option<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            mediators,
            on_error,
        }
    }

    /// Anonymous sequence declared inside another mediator's configuration
    pub fn inline(mediators: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            name: None,
            mediators,
            on_error: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(INLINE_SEQUENCE_NAME)
    }

    pub fn is_inline(&self) -> bool {
        self.name.is_none()
    }

    pub fn len(&self) -> usize {
        self.mediators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mediators.is_empty()
    }

    pub fn mediator(&self, position: usize) -> Option<&Arc<dyn Mediator>> {
        self.mediators.get(position)
    }

    pub fn mediators(&self) -> &[Arc<dyn Mediator>] {
        &self.mediators
    }

    pub fn on_error(&self) -> Option<&str> {
        self.on_error.as_deref()
    }

    /// Named sequences any mediator in this sequence may enter
    pub fn sequence_refs(&self) -> Vec<String> {
        self.mediators
            .iter()
            .flat_map(|m| m.sequence_refs())
            .collect()
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name())
            .field("mediators", &self.mediators.iter().map(|m| m.kind()).collect::<Vec<_>>())
            .field("on_error", &self.on_error)
            .finish()
    }
}

/// Every named sequence of one configuration, built and cross-checked.
///
/// Never mutated after construction; a reload builds a new graph.
#[derive(Debug, Default)]
pub struct SequenceGraph {
    sequences: HashMap<String, Arc<Sequence>>,
    entry: String,
}

impl SequenceGraph {
    /// Build every sequence in `config` with the registry's factories.
    ///
    /// Fails on the first fragment that does not resolve or validate, and on
    /// any reference to a sequence that is not defined.
    pub fn build(config: &EngineConfig, registry: &MediatorRegistry) -> Result<Self, MediationError> {
        config.validate()?;

        let ctx = FactoryContext::new(registry)
            .strict(config.engine.strict_validation)
            .trace_default(config.engine.trace_default);

        let mut sequences = HashMap::with_capacity(config.sequences.len());
        for definition in &config.sequences {
            let mediators = definition
                .mediators
                .iter()
                .map(|element| registry.build(element, &ctx))
                .collect::<Result<Vec<_>, _>>()?;

            debug!(
                sequence = %definition.name,
                mediators = mediators.len(),
                "Built sequence"
            );

            sequences.insert(
                definition.name.clone(),
                Arc::new(Sequence::named(
                    definition.name.clone(),
                    mediators,
                    definition.on_error.clone(),
                )),
            );
        }

        let graph = Self {
            sequences,
            entry: config.engine.entry_sequence.clone(),
        };
        graph.check_references()?;
        Ok(graph)
    }

    fn check_references(&self) -> Result<(), ConfigError> {
        let mut names: Vec<&String> = self.sequences.keys().collect();
        names.sort();

        for name in names {
            let Some(sequence) = self.sequences.get(name) else {
                continue;
            };
            for reference in sequence.sequence_refs() {
                if !self.sequences.contains_key(&reference) {
                    return Err(ConfigError::UnknownSequence {
                        name: reference,
                        referenced_by: format!("sequence '{name}'"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Sequence>> {
        self.sequences.get(name).cloned()
    }

    /// Default root sequence
    pub fn entry(&self) -> Option<Arc<Sequence>> {
        self.get(&self.entry)
    }

    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    /// Sequence names in a stable order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequences.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
