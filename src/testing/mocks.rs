//! Mock collaborators for exercising the engine without real sinks
//!
//! [`MemoryAuditSink`] captures audit records, [`FailingAuditSink`] rejects
//! them, [`StalledAuditSink`] never answers, and [`ProbeFactory`] builds `probe` mediators that record every
//! execution into a shared log so tests can assert on the exact trace.

use crate::audit::{AuditError, AuditOutcome, AuditRecord, AuditSink};
use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator};
use crate::message::MessageContext;
use crate::registry::factory::{invalid_attribute, reject_children, required_attribute};
use crate::registry::{FactoryContext, MediatorFactory, MediatorRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const PROBE_TAG: &str = "probe";

/// Shared, ordered log of probe executions
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Audit sink that keeps every record in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    pub records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    pub async fn outcomes_for(&self, mediator_kind: &str) -> Vec<AuditOutcome> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.mediator_kind == mediator_kind)
            .map(|r| r.outcome.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.records.lock().await.clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Audit sink whose every write fails
#[derive(Debug, Default, Clone)]
pub struct FailingAuditSink {
    pub attempts: Arc<AtomicUsize>,
}

impl FailingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::Unavailable("mock audit backend is down".to_string()))
    }
}

/// Audit sink whose writes never complete
#[derive(Debug, Default, Clone)]
pub struct StalledAuditSink {
    pub attempts: Arc<AtomicUsize>,
}

impl StalledAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for StalledAuditSink {
    async fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// No-op mediator that logs its id and bumps the `probe.<id>` property
#[derive(Debug)]
pub struct ProbeMediator {
    id: String,
    delay: Option<Duration>,
    executions: ExecutionLog,
    trace: bool,
}

#[async_trait]
impl Mediator for ProbeMediator {
    fn kind(&self) -> &'static str {
        PROBE_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn parameters(&self) -> Value {
        json!({
            "id": self.id,
            "delay_ms": self.delay.map(|d| d.as_millis() as u64),
        })
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        self.executions.lock().await.push(self.id.clone());

        let key = format!("probe.{}", self.id);
        let count = ctx.property(&key).and_then(Value::as_u64).unwrap_or(0);
        ctx.set_property(key, json!(count + 1));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Flow::Continue)
    }
}

/// Factory for `<probe id=".." delay_ms=".."/>`
#[derive(Debug, Default, Clone)]
pub struct ProbeFactory {
    pub executions: ExecutionLog,
}

impl ProbeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_executions(&self) -> Vec<String> {
        self.executions.lock().await.clone()
    }

    /// Built-in registry plus this probe factory
    pub fn registry(&self) -> MediatorRegistry {
        let mut registry = MediatorRegistry::builtin();
        // `probe` is not a built-in tag
        let _ = registry.register(Arc::new(self.clone()));
        registry
    }
}

impl MediatorFactory for ProbeFactory {
    fn tag(&self) -> QName {
        QName::mediation(PROBE_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &["id", "delay_ms"])?;
        reject_children(element)?;

        let delay = match element.attribute("delay_ms") {
            None => None,
            Some(raw) => Some(Duration::from_millis(raw.parse::<u64>().map_err(|e| {
                invalid_attribute(element, "delay_ms", e.to_string())
            })?)),
        };

        Ok(Arc::new(ProbeMediator {
            id: required_attribute(element, "id")?,
            delay,
            executions: Arc::clone(&self.executions),
            trace: ctx.process_trace(element)?,
        }))
    }
}
