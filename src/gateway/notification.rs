use tokio::sync::broadcast;

use crate::model::DomainEvent;

/// Receives lifecycle notifications. Delivery failures never reach callers.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent) -> anyhow::Result<()>;
}

/// Hand an event to the sink, logging instead of propagating failures
pub async fn notify(sink: &dyn EventSink, event: DomainEvent) {
    let name = event.name();
    if let Err(e) = sink.emit(event).await {
        log::warn!("Failed to deliver {} event: {:#}", name, e);
    }
}

/// Writes every event to the log as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

#[async_trait::async_trait]
impl EventSink for LogEventSink {
    async fn emit(&self, event: DomainEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&event)?;
        log::info!("event {}: {}", event.name(), payload);
        Ok(())
    }
}

/// Fans events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait::async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, event: DomainEvent) -> anyhow::Result<()> {
        // No subscribers is not an error
        if self.sender.receiver_count() == 0 {
            log::debug!("Dropping {} event, nobody is subscribed", event.name());
            return Ok(());
        }
        self.sender
            .send(event)
            .map_err(|e| anyhow::anyhow!("broadcast failed: {}", e))?;
        Ok(())
    }
}
