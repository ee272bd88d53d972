//! Mediator registry
//!
//! Maps namespaced configuration tags to the factory that builds that kind of
//! mediator. A registry is assembled once and then only read; reloads publish
//! a new registry rather than mutating a live one.

use crate::config::ConfigError;
use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{self, Mediator};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub mod factory;

pub use factory::{FactoryContext, MediatorFactory, TRACE_ATTRIBUTE};

/// Tag → factory lookup table
#[derive(Default, Clone)]
pub struct MediatorRegistry {
    factories: HashMap<QName, Arc<dyn MediatorFactory>>,
}

impl MediatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing every built-in mediator kind
    pub fn builtin() -> Self {
        let factories: Vec<Arc<dyn MediatorFactory>> = vec![
            Arc::new(mediators::LoopbackMediatorFactory),
            Arc::new(mediators::LogMediatorFactory),
            Arc::new(mediators::PropertyMediatorFactory),
            Arc::new(mediators::SequenceMediatorFactory),
            Arc::new(mediators::FilterMediatorFactory),
            Arc::new(mediators::DropMediatorFactory),
            Arc::new(mediators::RespondMediatorFactory),
            Arc::new(mediators::MakeFaultMediatorFactory),
        ];

        let mut registry = Self::new();
        for factory in factories {
            // Built-in tags are distinct
            let tag = factory.tag();
            registry.factories.insert(tag, factory);
        }
        registry
    }

    /// Register a factory; at most one factory may answer to a tag
    pub fn register(&mut self, factory: Arc<dyn MediatorFactory>) -> Result<(), MediationError> {
        let tag = factory.tag();
        if self.factories.contains_key(&tag) {
            return Err(ConfigError::DuplicateFactory(tag.to_string()).into());
        }
        debug!(tag = %tag, "Registered mediator factory");
        self.factories.insert(tag, factory);
        Ok(())
    }

    /// Builder-style [`Self::register`]
    pub fn with_factory(mut self, factory: Arc<dyn MediatorFactory>) -> Result<Self, MediationError> {
        self.register(factory)?;
        Ok(self)
    }

    /// Find the factory for a tag
    pub fn resolve(&self, tag: &QName) -> Result<Arc<dyn MediatorFactory>, MediationError> {
        self.factories
            .get(tag)
            .cloned()
            .ok_or_else(|| MediationError::unknown_mediator_kind(tag.to_string()))
    }

    /// Resolve a fragment's tag and let its factory build the mediator
    pub fn build(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        let tag = element
            .qname()
            .ok_or_else(|| ConfigError::InvalidTag(element.tag.clone()))?;
        let factory = self.resolve(&tag)?;
        debug_assert_eq!(factory.tag(), tag);
        factory.create(element, ctx)
    }

    pub fn contains(&self, tag: &QName) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags in a stable order
    pub fn tags(&self) -> Vec<QName> {
        let mut tags: Vec<QName> = self.factories.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for MediatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediatorRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
