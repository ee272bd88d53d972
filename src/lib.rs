//! Mediation Engine
//!
//! A configuration-driven message mediation core: a registry of mediator
//! factories turns declarative configuration fragments into immutable
//! mediators, and the engine threads each message through the resulting
//! sequences using an explicit per-message mediation stack.
//!
//! # Overview
//!
//! - Namespaced tag identity and configuration fragments ([`element`])
//! - Factory registry with load-time validation ([`registry`])
//! - Built-in mediators, including the `loopback` control-transfer mediator ([`mediators`])
//! - Per-message state with mediation and fault stacks ([`message`])
//! - The step-loop engine with atomic configuration reload ([`engine`])
//!
//! # Quick Start
//!
//! ```rust
//! use mediation_engine::{EngineConfig, MediationEngine, MediatorRegistry, Message};
//! use mediation_engine::audit::TracingAuditSink;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::from_toml_str(r#"
//! [engine]
//! name = "quickstart"
//! max_reinjections = 1
//!
//! [[sequence]]
//! name = "main"
//!
//! [[sequence.mediator]]
//! tag = "property"
//! attributes = { name = "stage", value = "seen" }
//!
//! [[sequence.mediator]]
//! tag = "loopback"
//! "#).unwrap();
//!
//! let engine = MediationEngine::new(
//!     MediatorRegistry::builtin(),
//!     &config,
//!     Arc::new(TracingAuditSink),
//! ).unwrap();
//!
//! # tokio_test::block_on(async {
//! let outcome = engine.process_default(Message::new(json!({"order": 7}))).await;
//! assert!(outcome.is_faulted());
//! assert_eq!(outcome.context().reinjection_count(), 2);
//! # });
//! ```

pub mod audit;
pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod mediators;
pub mod message;
pub mod observability;
pub mod registry;
pub mod testing;

pub use audit::{AuditError, AuditOutcome, AuditRecord, AuditSink, TracingAuditSink};
pub use config::{ConfigError, EngineConfig};
pub use element::{ConfigElement, QName, MEDIATION_NAMESPACE};
pub use engine::{MediationEngine, Outcome, OutcomeSummary, Sequence, SequenceGraph};
pub use error::{FaultCode, FaultReport, MediationError, MediationResult};
pub use mediators::{ControlTransfer, Flow, Mediator, MediatorDescriptor, SequenceTarget};
pub use message::{Direction, Disposition, MediationState, Message, MessageContext};
pub use registry::{FactoryContext, MediatorFactory, MediatorRegistry};
