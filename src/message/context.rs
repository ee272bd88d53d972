//! Per-message mediation state
//!
//! The mediation stack is an explicit list of (sequence, position) frames.
//! Sequence composition is call/return on this stack, so nested sequences,
//! fault handling and loopback re-entry never recurse on the Rust call stack.

use crate::engine::Sequence;
use crate::error::{FaultReport, MediationError};
use crate::message::envelope::{Direction, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Execution state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediationState {
    Running,
    /// A mediator is executing and may yield
    Suspended,
    Faulted,
    Completed,
}

/// How a completed message left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The mediation stack emptied
    EndOfFlow,
    /// A mediator halted the flow without a more specific disposition
    Stopped,
    Dropped,
    Responded,
}

/// One level of the mediation stack
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: Arc<Sequence>,
    /// Index of the next mediator to execute
    pub position: usize,
}

impl Frame {
    fn new(sequence: Arc<Sequence>) -> Self {
        Self {
            sequence,
            position: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.sequence.len()
    }
}

/// Who registered a fault handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerScope {
    /// The engine-wide fault sequence
    Global,
    /// A sequence's `on_error` handler, live while that frame is on the stack
    Sequence,
}

/// Entry on the fault stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultHandler {
    pub sequence: String,
    /// Stack index of the frame that registered this handler
    pub depth: usize,
    pub scope: HandlerScope,
}

/// Mutable state for one in-flight message
#[derive(Debug)]
pub struct MessageContext {
    correlation_id: Uuid,
    received_at: DateTime<Utc>,
    payload: Value,
    properties: HashMap<String, Value>,
    direction: Direction,
    root_sequence: String,
    stack: Vec<Frame>,
    fault_stack: Vec<FaultHandler>,
    reinjections: u32,
    fault_recoveries: u32,
    state: MediationState,
    disposition: Option<Disposition>,
    last_fault: Option<FaultReport>,
}

impl MessageContext {
    /// Build a context for a freshly received message
    pub fn new<S: Into<String>>(message: Message, root_sequence: S) -> Self {
        Self {
            correlation_id: message.correlation_id.unwrap_or_else(Uuid::new_v4),
            received_at: Utc::now(),
            payload: message.payload,
            properties: message.properties,
            direction: message.direction,
            root_sequence: root_sequence.into(),
            stack: Vec::new(),
            fault_stack: Vec::new(),
            reinjections: 0,
            fault_recoveries: 0,
            state: MediationState::Running,
            disposition: None,
            last_fault: None,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property<K: Into<String>>(&mut self, name: K, value: Value) {
        self.properties.insert(name.into(), value);
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn is_response(&self) -> bool {
        self.direction == Direction::Response
    }

    /// Name of the sequence this message entered at, and re-enters at on loopback
    pub fn root_sequence(&self) -> &str {
        &self.root_sequence
    }

    pub fn mediation_stack(&self) -> &[Frame] {
        &self.stack
    }

    pub fn fault_stack(&self) -> &[FaultHandler] {
        &self.fault_stack
    }

    pub fn reinjection_count(&self) -> u32 {
        self.reinjections
    }

    pub fn fault_recoveries(&self) -> u32 {
        self.fault_recoveries
    }

    pub fn state(&self) -> MediationState {
        self.state
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    /// Record how the message is leaving the pipeline; used by terminal mediators
    pub fn set_disposition(&mut self, disposition: Disposition) {
        self.disposition = Some(disposition);
    }

    /// Most recent fault seen by this message, handled or not
    pub fn last_fault(&self) -> Option<&FaultReport> {
        self.last_fault.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: MediationState) {
        self.state = state;
    }

    pub(crate) fn clear_properties(&mut self) {
        self.properties.clear();
    }

    pub(crate) fn record_fault(&mut self, report: FaultReport) {
        self.last_fault = Some(report);
    }

    pub(crate) fn record_fault_recovery(&mut self) -> u32 {
        self.fault_recoveries += 1;
        self.fault_recoveries
    }

    /// Count one control transfer and return the new total
    pub(crate) fn record_reinjection(&mut self) -> u32 {
        self.reinjections += 1;
        self.reinjections
    }

    pub(crate) fn register_global_handler<S: Into<String>>(&mut self, sequence: S) {
        self.fault_stack.push(FaultHandler {
            sequence: sequence.into(),
            depth: 0,
            scope: HandlerScope::Global,
        });
    }

    /// Push a frame for `sequence`, registering its `on_error` handler if asked
    pub(crate) fn push_frame(
        &mut self,
        sequence: Arc<Sequence>,
        register_handler: bool,
        max_depth: usize,
    ) -> Result<(), MediationError> {
        let depth = self.stack.len();
        if depth >= max_depth {
            return Err(MediationError::StackDepthExceeded {
                depth: depth + 1,
                max: max_depth,
            });
        }

        if register_handler {
            if let Some(handler) = sequence.on_error() {
                self.fault_stack.push(FaultHandler {
                    sequence: handler.to_string(),
                    depth,
                    scope: HandlerScope::Sequence,
                });
            }
        }

        self.stack.push(Frame::new(sequence));
        Ok(())
    }

    pub(crate) fn current_frame(&self) -> Option<&Frame> {
        self.stack.last()
    }

    /// Move the top frame past the mediator that just ran
    pub(crate) fn advance(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.position += 1;
        }
    }

    /// Return from the top frame, dropping the handlers it registered
    pub(crate) fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.stack.pop()?;
        let depth = self.stack.len();
        self.fault_stack
            .retain(|h| h.scope == HandlerScope::Global || h.depth < depth);
        Some(frame)
    }

    /// Replace the whole stack with a single fresh frame at the root sequence.
    ///
    /// The stack never grows across re-entries; the fault stack is rebuilt to
    /// what a newly arrived message would have.
    pub(crate) fn reset_to_root(
        &mut self,
        root: Arc<Sequence>,
        global_handler: Option<&str>,
    ) {
        self.stack.clear();
        self.fault_stack.clear();
        if let Some(handler) = global_handler {
            self.register_global_handler(handler);
        }
        let depth = 0;
        if let Some(handler) = root.on_error() {
            self.fault_stack.push(FaultHandler {
                sequence: handler.to_string(),
                depth,
                scope: HandlerScope::Sequence,
            });
        }
        self.stack.push(Frame::new(root));
    }

    /// Pop the innermost fault handler and discard the frames it covers.
    ///
    /// After this returns `Some(handler)` the mediation stack holds only the
    /// frames below the one that registered the handler, ready for the
    /// handler sequence to be pushed in its place.
    pub(crate) fn unwind_to_handler(&mut self) -> Option<FaultHandler> {
        let handler = self.fault_stack.pop()?;
        let keep = match handler.scope {
            HandlerScope::Global => 0,
            HandlerScope::Sequence => handler.depth,
        };
        self.stack.truncate(keep);
        self.fault_stack
            .retain(|h| h.scope == HandlerScope::Global || h.depth < keep);
        Some(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seq(name: &str, on_error: Option<&str>) -> Arc<Sequence> {
        Arc::new(Sequence::named(
            name,
            Vec::new(),
            on_error.map(str::to_string),
        ))
    }

    fn context() -> MessageContext {
        MessageContext::new(Message::new(json!({"a": 1})), "main")
    }

    #[test]
    fn test_new_context_keeps_message_state() {
        let id = Uuid::new_v4();
        let message = Message::new(json!("body"))
            .with_correlation_id(id)
            .with_property("tenant", json!("acme"));

        let ctx = MessageContext::new(message, "main");

        assert_eq!(ctx.correlation_id(), id);
        assert_eq!(ctx.payload(), &json!("body"));
        assert_eq!(ctx.property("tenant"), Some(&json!("acme")));
        assert_eq!(ctx.root_sequence(), "main");
        assert_eq!(ctx.state(), MediationState::Running);
        assert!(ctx.mediation_stack().is_empty());
        assert_eq!(ctx.reinjection_count(), 0);
    }

    #[test]
    fn test_push_frame_registers_handler_at_depth() {
        let mut ctx = context();
        ctx.push_frame(seq("main", Some("main-fault")), true, 8).unwrap();
        ctx.push_frame(seq("inner", Some("inner-fault")), true, 8).unwrap();

        let handlers = ctx.fault_stack();
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].depth, 0);
        assert_eq!(handlers[1].depth, 1);
        assert_eq!(handlers[1].sequence, "inner-fault");
    }

    #[test]
    fn test_push_frame_without_registration() {
        let mut ctx = context();
        ctx.push_frame(seq("handler", Some("other")), false, 8).unwrap();
        assert!(ctx.fault_stack().is_empty());
    }

    #[test]
    fn test_pop_frame_drops_owned_handlers_only() {
        let mut ctx = context();
        ctx.register_global_handler("global");
        ctx.push_frame(seq("main", Some("main-fault")), true, 8).unwrap();
        ctx.push_frame(seq("inner", Some("inner-fault")), true, 8).unwrap();

        ctx.pop_frame();

        let names: Vec<_> = ctx.fault_stack().iter().map(|h| h.sequence.as_str()).collect();
        assert_eq!(names, vec!["global", "main-fault"]);
    }

    #[test]
    fn test_stack_depth_limit() {
        let mut ctx = context();
        ctx.push_frame(seq("a", None), true, 2).unwrap();
        ctx.push_frame(seq("b", None), true, 2).unwrap();

        let err = ctx.push_frame(seq("c", None), true, 2).unwrap_err();
        assert!(matches!(err, MediationError::StackDepthExceeded { depth: 3, max: 2 }));
        assert_eq!(ctx.mediation_stack().len(), 2);
    }

    #[test]
    fn test_reset_to_root_replaces_stack() {
        let mut ctx = context();
        ctx.push_frame(seq("main", None), true, 8).unwrap();
        ctx.advance();
        ctx.push_frame(seq("inner", Some("inner-fault")), true, 8).unwrap();
        ctx.advance();

        ctx.reset_to_root(seq("main", Some("main-fault")), Some("global"));

        assert_eq!(ctx.mediation_stack().len(), 1);
        assert_eq!(ctx.mediation_stack()[0].position, 0);
        assert_eq!(ctx.mediation_stack()[0].sequence.name(), "main");
        let names: Vec<_> = ctx.fault_stack().iter().map(|h| h.sequence.as_str()).collect();
        assert_eq!(names, vec!["global", "main-fault"]);
    }

    #[test]
    fn test_unwind_to_sequence_handler() {
        let mut ctx = context();
        ctx.register_global_handler("global");
        ctx.push_frame(seq("main", None), true, 8).unwrap();
        ctx.push_frame(seq("mid", Some("mid-fault")), true, 8).unwrap();
        ctx.push_frame(seq("leaf", None), true, 8).unwrap();

        let handler = ctx.unwind_to_handler().unwrap();

        assert_eq!(handler.sequence, "mid-fault");
        assert_eq!(ctx.mediation_stack().len(), 1);
        assert_eq!(ctx.mediation_stack()[0].sequence.name(), "main");
        assert_eq!(ctx.fault_stack().len(), 1);
        assert_eq!(ctx.fault_stack()[0].scope, HandlerScope::Global);
    }

    #[test]
    fn test_unwind_to_global_handler_clears_stack() {
        let mut ctx = context();
        ctx.register_global_handler("global");
        ctx.push_frame(seq("main", None), true, 8).unwrap();

        let handler = ctx.unwind_to_handler().unwrap();

        assert_eq!(handler.scope, HandlerScope::Global);
        assert!(ctx.mediation_stack().is_empty());
        assert!(ctx.fault_stack().is_empty());
        assert!(ctx.unwind_to_handler().is_none());
    }

    #[test]
    fn test_reinjection_counter() {
        let mut ctx = context();
        assert_eq!(ctx.record_reinjection(), 1);
        assert_eq!(ctx.record_reinjection(), 2);
        assert_eq!(ctx.reinjection_count(), 2);
    }
}
