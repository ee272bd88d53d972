//! Mediation engine: drives messages through the active sequence graph
//!
//! The engine never recurses. Every message owns an explicit mediation stack
//! and the engine runs a single loop over it: execute the mediator at the top
//! frame, then advance, push, pop, reset or unwind according to the result.
//!
//! Configuration is published as one immutable [`ActiveConfiguration`]
//! snapshot. Each message pins the snapshot current at entry for its whole
//! life, including re-entries, so a reload never changes the graph under an
//! in-flight message.

use crate::audit::{AuditOutcome, AuditRecord, AuditSink};
use crate::config::{DirectionPolicy, EngineConfig, EngineSection, LoopbackSection};
use crate::engine::outcome::Outcome;
use crate::engine::sequence::SequenceGraph;
use crate::error::MediationError;
use crate::mediators::{ControlTransfer, Flow, Mediator, SequenceTarget};
use crate::message::{Direction, Disposition, MediationState, Message, MessageContext};
use crate::observability::metrics;
use crate::registry::MediatorRegistry;
use arc_swap::ArcSwap;
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Property holding the code of the fault being handled
pub const ERROR_CODE_PROPERTY: &str = "ERROR_CODE";
/// Property holding the sanitized message of the fault being handled
pub const ERROR_MESSAGE_PROPERTY: &str = "ERROR_MESSAGE";

/// Runtime limits and policies taken from `[engine]`
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub name: String,
    pub entry_sequence: String,
    pub fault_sequence: Option<String>,
    pub max_reinjections: u32,
    pub max_stack_depth: usize,
    pub max_fault_recoveries: u32,
    pub processing_timeout: Option<Duration>,
    pub audit_timeout: Duration,
    pub loopback: LoopbackSection,
}

impl From<&EngineSection> for EngineSettings {
    fn from(section: &EngineSection) -> Self {
        Self {
            name: section.name.clone(),
            entry_sequence: section.entry_sequence.clone(),
            fault_sequence: section.fault_sequence.clone(),
            max_reinjections: section.max_reinjections,
            max_stack_depth: section.max_stack_depth,
            max_fault_recoveries: section.max_fault_recoveries,
            processing_timeout: section.processing_timeout_ms.map(Duration::from_millis),
            audit_timeout: Duration::from_millis(section.audit_timeout_ms),
            loopback: section.loopback.clone(),
        }
    }
}

/// One published configuration: registry, built graph and settings
#[derive(Debug)]
pub struct ActiveConfiguration {
    pub registry: Arc<MediatorRegistry>,
    pub graph: SequenceGraph,
    pub settings: EngineSettings,
    pub generation: u64,
}

impl ActiveConfiguration {
    fn build(
        registry: Arc<MediatorRegistry>,
        config: &EngineConfig,
        generation: u64,
    ) -> Result<Self, MediationError> {
        let graph = SequenceGraph::build(config, &registry)?;
        Ok(Self {
            registry,
            graph,
            settings: EngineSettings::from(&config.engine),
            generation,
        })
    }
}

pub struct MediationEngine {
    active: ArcSwap<ActiveConfiguration>,
    audit: Arc<dyn AuditSink>,
    reload_lock: Mutex<()>,
}

impl MediationEngine {
    /// Build the first configuration and publish it.
    ///
    /// Fails with a configuration-time error if any fragment does not resolve
    /// or validate.
    pub fn new(
        registry: MediatorRegistry,
        config: &EngineConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, MediationError> {
        let span = crate::config_span!(engine = %config.engine.name, generation = 1u64);
        let _enter = span.enter();

        let active = ActiveConfiguration::build(Arc::new(registry), config, 1)?;
        info!(
            sequences = active.graph.len(),
            mediator_kinds = active.registry.len(),
            "Mediation engine configured"
        );
        metrics().set_active_generation(active.generation);

        Ok(Self {
            active: ArcSwap::from_pointee(active),
            audit,
            reload_lock: Mutex::new(()),
        })
    }

    /// Rebuild the sequence graph against the current registry
    pub fn reload(&self, config: &EngineConfig) -> Result<u64, MediationError> {
        let registry = Arc::clone(&self.active.load().registry);
        self.publish(registry, config)
    }

    /// Replace both the registry and the sequence graph
    pub fn reload_with_registry(
        &self,
        registry: MediatorRegistry,
        config: &EngineConfig,
    ) -> Result<u64, MediationError> {
        self.publish(Arc::new(registry), config)
    }

    /// Build fully, then swap in a single store; on failure nothing changes
    fn publish(
        &self,
        registry: Arc<MediatorRegistry>,
        config: &EngineConfig,
    ) -> Result<u64, MediationError> {
        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let generation = self.active.load().generation + 1;
        let span = crate::config_span!(engine = %config.engine.name, generation);
        let _enter = span.enter();

        match ActiveConfiguration::build(registry, config, generation) {
            Ok(active) => {
                info!(sequences = active.graph.len(), "Configuration reloaded");
                self.active.store(Arc::new(active));
                metrics().config_reloaded(generation);
                Ok(generation)
            }
            Err(e) => {
                error!(error = %e, "Configuration reload failed, keeping previous configuration");
                metrics().config_reload_failed();
                Err(e)
            }
        }
    }

    pub fn registry(&self) -> Arc<MediatorRegistry> {
        Arc::clone(&self.active.load().registry)
    }

    /// Snapshot of the currently published configuration
    pub fn active(&self) -> Arc<ActiveConfiguration> {
        self.active.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.active.load().generation
    }

    /// Process a message starting at the configured entry sequence
    pub async fn process_default(&self, message: Message) -> Outcome {
        let active = self.active.load_full();
        let entry = active.settings.entry_sequence.clone();
        self.process_pinned(active, message, &entry).await
    }

    /// Process a message starting at `entry`
    pub async fn process(&self, message: Message, entry: &str) -> Outcome {
        let active = self.active.load_full();
        self.process_pinned(active, message, entry).await
    }

    async fn process_pinned(
        &self,
        active: Arc<ActiveConfiguration>,
        message: Message,
        entry: &str,
    ) -> Outcome {
        let started = Instant::now();
        let mut ctx = MessageContext::new(message, entry);
        metrics().message_received();

        let span = crate::message_span!(
            correlation_id = %ctx.correlation_id(),
            entry = %entry,
            generation = active.generation
        );

        let result = async {
            self.enter(&active, &mut ctx, entry)?;
            self.drive(&active, &mut ctx, started).await
        }
        .instrument(span.clone())
        .await;

        let _enter = span.enter();
        match result {
            Ok(disposition) => {
                ctx.set_disposition(disposition);
                ctx.set_state(MediationState::Completed);
                metrics().message_completed(started.elapsed());
                debug!(?disposition, reinjections = ctx.reinjection_count(), "Message completed");
                Outcome::Completed {
                    context: ctx,
                    disposition,
                }
            }
            Err(error) => {
                ctx.record_fault(error.to_fault_report(ctx.correlation_id()));
                ctx.set_state(MediationState::Faulted);
                metrics().message_faulted(started.elapsed());
                warn!(error = %error, reinjections = ctx.reinjection_count(), "Message faulted");
                Outcome::Faulted {
                    context: ctx,
                    error,
                }
            }
        }
    }

    /// Push the single root frame, with the global handler beneath it
    fn enter(
        &self,
        active: &ActiveConfiguration,
        ctx: &mut MessageContext,
        entry: &str,
    ) -> Result<(), MediationError> {
        let root = active
            .graph
            .get(entry)
            .ok_or_else(|| MediationError::InvalidEntry {
                name: entry.to_string(),
                reason: "sequence is not defined".to_string(),
            })?;
        if root.is_empty() {
            return Err(MediationError::InvalidEntry {
                name: entry.to_string(),
                reason: "sequence has no mediators".to_string(),
            });
        }

        ctx.reset_to_root(root, active.settings.fault_sequence.as_deref());
        ctx.set_state(MediationState::Running);
        Ok(())
    }

    /// Step loop; returns the disposition or a terminal error
    async fn drive(
        &self,
        active: &ActiveConfiguration,
        ctx: &mut MessageContext,
        started: Instant,
    ) -> Result<Disposition, MediationError> {
        let settings = &active.settings;
        let deadline = settings
            .processing_timeout
            .map(|timeout| tokio::time::Instant::from_std(started + timeout));
        let window = AuditWindow {
            timeout: settings.audit_timeout,
            deadline,
        };

        loop {
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Err(timeout_error(started));
                }
            }

            let Some(frame) = ctx.current_frame() else {
                return Ok(ctx.disposition().unwrap_or(Disposition::EndOfFlow));
            };
            let sequence = Arc::clone(&frame.sequence);
            let position = frame.position;
            let Some(mediator) = sequence.mediator(position).cloned() else {
                ctx.pop_frame();
                continue;
            };

            let span = crate::mediator_span!(
                kind = mediator.kind(),
                sequence = %sequence.name(),
                position
            );
            let step_started = Instant::now();
            ctx.set_state(MediationState::Suspended);
            let result = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, mediator.mediate(ctx))
                        .instrument(span)
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            ctx.set_state(MediationState::Running);
                            return Err(timeout_error(started));
                        }
                    }
                }
                None => mediator.mediate(ctx).instrument(span).await,
            };
            ctx.set_state(MediationState::Running);
            metrics().mediator_executed(mediator.kind(), step_started.elapsed(), result.is_ok());

            let step = match result {
                Ok(Flow::Continue) => {
                    ctx.advance();
                    self.audit(window, mediator.as_ref(), ctx, AuditOutcome::Continued).await;
                    Ok(())
                }
                Ok(Flow::Enter(target)) => {
                    ctx.advance();
                    self.audit(
                        window,
                        mediator.as_ref(),
                        ctx,
                        AuditOutcome::Entered {
                            sequence: target.name().to_string(),
                        },
                    )
                    .await;
                    self.enter_sequence(active, ctx, target)
                }
                Ok(Flow::Stop) if mediator.control_transfer() == ControlTransfer::Reinject => {
                    match self.reinject(active, ctx) {
                        Ok(reinjections) => {
                            self.audit(
                                window,
                                mediator.as_ref(),
                                ctx,
                                AuditOutcome::Reentered { reinjections },
                            )
                            .await;
                            Ok(())
                        }
                        Err(e) => {
                            self.audit(
                                window,
                                mediator.as_ref(),
                                ctx,
                                AuditOutcome::Faulted {
                                    message: e.to_string(),
                                },
                            )
                            .await;
                            Err(e)
                        }
                    }
                }
                Ok(Flow::Stop) => {
                    self.audit(window, mediator.as_ref(), ctx, AuditOutcome::Stopped).await;
                    return Ok(ctx.disposition().unwrap_or(Disposition::Stopped));
                }
                Err(e) => {
                    self.audit(
                        window,
                        mediator.as_ref(),
                        ctx,
                        AuditOutcome::Faulted {
                            message: e.to_string(),
                        },
                    )
                    .await;
                    Err(e)
                }
            };

            if let Err(error) = step {
                self.handle_fault(active, ctx, error)?;
            }
        }
    }

    /// Call into a nested sequence; its `on_error` handler is live until it returns
    fn enter_sequence(
        &self,
        active: &ActiveConfiguration,
        ctx: &mut MessageContext,
        target: SequenceTarget,
    ) -> Result<(), MediationError> {
        let sequence = match target {
            SequenceTarget::Named(name) => active
                .graph
                .get(&name)
                .ok_or_else(|| MediationError::sequence_not_found(name))?,
            SequenceTarget::Inline(sequence) => sequence,
        };
        ctx.push_frame(sequence, true, active.settings.max_stack_depth)
    }

    /// Control transfer: count, enforce the limit, then replace the whole stack
    fn reinject(
        &self,
        active: &ActiveConfiguration,
        ctx: &mut MessageContext,
    ) -> Result<u32, MediationError> {
        let settings = &active.settings;
        let reinjections = ctx.record_reinjection();
        metrics().reinjection();

        if reinjections > settings.max_reinjections {
            metrics().loop_limit_exceeded();
            return Err(MediationError::loop_limit_exceeded(
                reinjections,
                settings.max_reinjections,
            ));
        }

        let root = active
            .graph
            .get(ctx.root_sequence())
            .ok_or_else(|| MediationError::sequence_not_found(ctx.root_sequence()))?;

        if settings.loopback.clear_properties {
            ctx.clear_properties();
        }
        match settings.loopback.direction {
            DirectionPolicy::Preserve => {}
            DirectionPolicy::Request => ctx.set_direction(Direction::Request),
            DirectionPolicy::Response => ctx.set_direction(Direction::Response),
        }

        ctx.reset_to_root(root, settings.fault_sequence.as_deref());
        debug!(
            reinjections,
            max = settings.max_reinjections,
            root = %ctx.root_sequence(),
            "Message re-entered at root sequence"
        );
        Ok(reinjections)
    }

    /// Route a fault to the innermost handler, or return it as terminal
    fn handle_fault(
        &self,
        active: &ActiveConfiguration,
        ctx: &mut MessageContext,
        error: MediationError,
    ) -> Result<(), MediationError> {
        let settings = &active.settings;
        let report = error.to_fault_report(ctx.correlation_id());
        ctx.record_fault(report.clone());

        if !error.is_runtime_fault() {
            return Err(error);
        }
        if ctx.fault_recoveries() >= settings.max_fault_recoveries {
            warn!(
                recoveries = ctx.fault_recoveries(),
                max = settings.max_fault_recoveries,
                "Fault recovery limit reached"
            );
            return Err(error);
        }

        let Some(handler) = ctx.unwind_to_handler() else {
            return Err(error);
        };
        let Some(sequence) = active.graph.get(&handler.sequence) else {
            return Err(error);
        };

        ctx.set_property(ERROR_CODE_PROPERTY, json!(error.property_code()));
        ctx.set_property(ERROR_MESSAGE_PROPERTY, json!(report.message));
        ctx.record_fault_recovery();
        metrics().fault_recovered();

        info!(
            code = %report.code.as_str(),
            handler = %handler.sequence,
            scope = ?handler.scope,
            "Routing fault to handler sequence"
        );

        ctx.push_frame(sequence, false, settings.max_stack_depth)
    }

    /// Hand a record to the audit sink without letting it stall the message.
    ///
    /// Each write is bounded by the audit timeout and never outlives the
    /// message deadline; a slow or failing sink only costs a dropped record.
    async fn audit(
        &self,
        window: AuditWindow,
        mediator: &dyn Mediator,
        ctx: &MessageContext,
        outcome: AuditOutcome,
    ) {
        if !mediator.is_traced() {
            return;
        }

        let record = AuditRecord::new(mediator.kind(), ctx.correlation_id(), outcome);
        match tokio::time::timeout_at(window.expires_at(), self.audit.record(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics().audit_failed();
                warn!(error = %e, mediator = mediator.kind(), "Audit record dropped");
            }
            Err(_) => {
                metrics().audit_failed();
                warn!(
                    mediator = mediator.kind(),
                    timeout_ms = window.timeout.as_millis() as u64,
                    "Audit sink timed out, record dropped"
                );
            }
        }
    }
}

impl fmt::Debug for MediationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.active.load();
        f.debug_struct("MediationEngine")
            .field("engine", &active.settings.name)
            .field("generation", &active.generation)
            .field("sequences", &active.graph.names())
            .finish()
    }
}

/// Time budget for one audit write
#[derive(Debug, Clone, Copy)]
struct AuditWindow {
    timeout: Duration,
    deadline: Option<tokio::time::Instant>,
}

impl AuditWindow {
    fn expires_at(&self) -> tokio::time::Instant {
        let limit = tokio::time::Instant::now() + self.timeout;
        match self.deadline {
            Some(deadline) => limit.min(deadline),
            None => limit,
        }
    }
}

fn timeout_error(started: Instant) -> MediationError {
    MediationError::ProcessingTimeout {
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAuditSink;

    fn engine(toml: &str) -> MediationEngine {
        let config = EngineConfig::from_toml_str(toml).unwrap();
        MediationEngine::new(MediatorRegistry::builtin(), &config, Arc::new(TracingAuditSink)).unwrap()
    }

    #[tokio::test]
    async fn test_end_of_flow() {
        let engine = engine(
            r#"
[engine]
name = "t"

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "property"
attributes = { name = "seen", value = "yes" }
"#,
        );

        let outcome = engine.process_default(Message::default()).await;

        assert_eq!(outcome.disposition(), Some(Disposition::EndOfFlow));
        assert_eq!(outcome.context().state(), MediationState::Completed);
        assert_eq!(outcome.context().property("seen"), Some(&json!("yes")));
        assert!(outcome.context().mediation_stack().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_entry_is_faulted() {
        let engine = engine(
            r#"
[engine]
name = "t"

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "drop"
"#,
        );

        let outcome = engine.process(Message::default(), "nowhere").await;
        assert!(matches!(outcome.error(), Some(MediationError::InvalidEntry { .. })));
        assert_eq!(outcome.context().state(), MediationState::Faulted);
    }

    #[tokio::test]
    async fn test_loopback_with_cleared_properties_and_response_direction() {
        let engine = engine(
            r#"
[engine]
name = "t"
max_reinjections = 1

[engine.loopback]
direction = "response"
clear_properties = true

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "filter"
attributes = { source = "looped", equals = "yes" }

[[sequence.mediator.child]]
tag = "then"

[[sequence.mediator.child.child]]
tag = "drop"

[[sequence.mediator]]
tag = "property"
attributes = { name = "looped", value = "yes" }

[[sequence.mediator]]
tag = "loopback"
"#,
        );

        let outcome = engine.process_default(Message::default()).await;

        // Properties were cleared on re-entry, so the filter never matched and
        // the second loopback hit the limit.
        assert!(matches!(
            outcome.error(),
            Some(MediationError::LoopLimitExceeded { count: 2, max: 1 })
        ));
        assert!(outcome.context().is_response());
    }

    #[tokio::test]
    async fn test_stack_depth_limit_faults() {
        let engine = engine(
            r#"
[engine]
name = "t"
max_stack_depth = 3

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "sequence"
attributes = { key = "main" }
"#,
        );

        let outcome = engine.process_default(Message::default()).await;
        assert!(matches!(
            outcome.error(),
            Some(MediationError::StackDepthExceeded { depth: 4, max: 3 })
        ));
    }

    #[tokio::test]
    async fn test_fault_recovery_limit() {
        // The handler loops back, so every pass re-registers the global
        // handler and only the recovery limit can end the message.
        let engine = engine(
            r#"
[engine]
name = "t"
fault_sequence = "fault"
max_fault_recoveries = 2
max_reinjections = 100

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "makefault"
attributes = { code = "E1" }

[[sequence]]
name = "fault"

[[sequence.mediator]]
tag = "loopback"
"#,
        );

        let outcome = engine.process_default(Message::default()).await;

        match outcome.error() {
            Some(MediationError::Fault { code, .. }) => assert_eq!(code, "E1"),
            other => panic!("expected the third fault to be terminal, got {other:?}"),
        }
        let ctx = outcome.context();
        assert_eq!(ctx.fault_recoveries(), 2);
        assert_eq!(ctx.reinjection_count(), 2);
        assert_eq!(ctx.state(), MediationState::Faulted);
    }

    #[test]
    fn test_settings_from_section() {
        let config = EngineConfig::test_config();
        let settings = EngineSettings::from(&config.engine);

        assert_eq!(settings.max_reinjections, 2);
        assert_eq!(settings.entry_sequence, "main");
        assert!(settings.processing_timeout.is_none());
        assert_eq!(settings.audit_timeout, Duration::from_millis(250));
    }
}
