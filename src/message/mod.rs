//! Inbound messages and per-message mediation state
//!
//! [`Message`] is what arrives from a transport; [`MessageContext`] is the
//! mutable state that travels through the pipeline, including the explicit
//! mediation and fault stacks the engine drives instead of recursing.

pub mod context;
pub mod envelope;

pub use context::{Disposition, FaultHandler, Frame, HandlerScope, MediationState, MessageContext};
pub use envelope::{Direction, Message};
