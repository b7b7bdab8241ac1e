use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum CycleEvent {
    Started {
        cycle_id: Uuid,
        endpoint: String,
        sources: usize,
        at: DateTime<Utc>,
    },
    SourceCompleted {
        cycle_id: Uuid,
        source_id: String,
        success: bool,
        elapsed: Duration,
    },
    Completed {
        cycle_id: Uuid,
        findings: usize,
        failures: usize,
        duration: Duration,
    },
}

/// Sink for collection cycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: CycleEvent);
}

/// Channel-based event sink that forwards events to a receiver.
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::UnboundedSender<CycleEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<CycleEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: CycleEvent) {
        let _ = self.tx.send(event);
    }
}

/// Simple tracing-based event sink.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: CycleEvent) {
        tracing::info!(?event, "cycle_event");
    }
}
