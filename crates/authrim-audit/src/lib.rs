//! Audit event pipeline
//!
//! Every security-relevant state transition produces an [`AuditEvent`].
//! Delivery is best-effort: the queued logger drops events (with a warning)
//! rather than block a request path when the sink is saturated.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Categories of audit events
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authorization,
    Token,
    KeyManagement,
    Provisioning,
    ClientAuth,
}

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl Serialize for AuditSeverity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = match self {
            AuditSeverity::Info => "INFO",
            AuditSeverity::Warning => "WARNING",
            AuditSeverity::Critical => "CRITICAL",
        };
        serializer.serialize_str(s)
    }
}

/// Structured audit event
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub action: String,
    pub severity: AuditSeverity,
    pub actor: Option<String>,
    pub resource: Option<String>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        category: AuditCategory,
        action: impl Into<String>,
        severity: AuditSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            action: action.into(),
            severity,
            actor: None,
            resource: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Trait for recording audit events
#[async_trait::async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, event: AuditEvent);
}

/// Structured output through `tracing`, target "audit" so these records can
/// be routed separately from application logs.
pub struct TracingAuditLogger;

#[async_trait::async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            event_id = %event.id,
            category = ?event.category,
            action = %event.action,
            severity = ?event.severity,
            actor = ?event.actor,
            resource = ?event.resource,
            payload = %serde_json::to_string(&event).unwrap_or_default(),
            "AUDIT_EVENT"
        );
    }
}

/// Channel-backed logger that offloads delivery to a background worker.
/// A full queue drops the event rather than stall the auth flow.
pub struct QueuedAuditLogger {
    sender: mpsc::Sender<AuditEvent>,
}

impl QueuedAuditLogger {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (Self { sender: tx }, rx)
    }
}

#[async_trait::async_trait]
impl AuditLogger for QueuedAuditLogger {
    async fn log(&self, event: AuditEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Audit queue full, dropping event: {}", e);
        }
    }
}

/// Background worker draining the queue into the real sink.
pub struct AuditWorker {
    receiver: mpsc::Receiver<AuditEvent>,
    delegate: std::sync::Arc<dyn AuditLogger>,
}

impl AuditWorker {
    pub fn new(receiver: mpsc::Receiver<AuditEvent>, delegate: std::sync::Arc<dyn AuditLogger>) -> Self {
        Self { receiver, delegate }
    }

    pub async fn run(mut self) {
        tracing::info!("Audit worker started");
        while let Some(event) = self.receiver.recv().await {
            self.delegate.log(event).await;
        }
        tracing::info!("Audit worker stopped");
    }
}

/// Captures events in memory; test use only.
#[derive(Default)]
pub struct MemoryAuditLogger {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn find(&self, action: &str) -> Option<AuditEvent> {
        self.events.lock().iter().find(|e| e.action == action).cloned()
    }
}

#[async_trait::async_trait]
impl AuditLogger for MemoryAuditLogger {
    async fn log(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
