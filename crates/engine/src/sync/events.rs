//! Domain events emitted by the sync engine.

use serde::Serialize;
use shopsync_core::{StoreId, SyncFamily};
use tokio::sync::broadcast;
use tracing::info;

use crate::models::{OrderAggregate, ProductAggregate};

/// A freshly reloaded entity attached to a created/updated event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "entity", rename_all = "snake_case")]
pub enum ImportedEntity {
    Order(Box<OrderAggregate>),
    Product(Box<ProductAggregate>),
}

impl ImportedEntity {
    #[must_use]
    pub const fn family(&self) -> SyncFamily {
        match self {
            Self::Order(_) => SyncFamily::Orders,
            Self::Product(_) => SyncFamily::Products,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    EntityCreated {
        store_id: StoreId,
        entity: ImportedEntity,
    },
    EntityUpdated {
        store_id: StoreId,
        entity: ImportedEntity,
    },
    /// A walk for one family finished its last page.
    FamilySynced {
        store_id: StoreId,
        family: SyncFamily,
    },
    /// A store refresh wrote new shop settings.
    StoreUpdated {
        store_id: StoreId,
    },
    /// The platform rejected us with a status that usually means uninstall.
    UninstallSuggested {
        store_id: StoreId,
        status: u16,
    },
}

impl SyncEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EntityCreated { .. } => "entity_created",
            Self::EntityUpdated { .. } => "entity_updated",
            Self::FamilySynced { .. } => "family_synced",
            Self::StoreUpdated { .. } => "store_updated",
            Self::UninstallSuggested { .. } => "uninstall_suggested",
        }
    }

    #[must_use]
    pub const fn store_id(&self) -> StoreId {
        match self {
            Self::EntityCreated { store_id, .. }
            | Self::EntityUpdated { store_id, .. }
            | Self::FamilySynced { store_id, .. }
            | Self::StoreUpdated { store_id }
            | Self::UninstallSuggested { store_id, .. } => *store_id,
        }
    }
}

/// Receives domain events. Publishing never fails the sync.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SyncEvent);
}

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastEvents {
    sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastEvents {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEvents {
    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

/// Writes each event as a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEvents;

impl EventSink for LogEvents {
    fn publish(&self, event: SyncEvent) {
        match &event {
            SyncEvent::EntityCreated { entity, .. } | SyncEvent::EntityUpdated { entity, .. } => {
                info!(
                    event = event.name(),
                    store_id = %event.store_id(),
                    family = %entity.family(),
                    "Sync event"
                );
            }
            SyncEvent::FamilySynced { family, .. } => {
                info!(event = event.name(), store_id = %event.store_id(), %family, "Sync event");
            }
            SyncEvent::StoreUpdated { .. } => {
                info!(event = event.name(), store_id = %event.store_id(), "Sync event");
            }
            SyncEvent::UninstallSuggested { status, .. } => {
                info!(event = event.name(), store_id = %event.store_id(), status, "Sync event");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let events = BroadcastEvents::new(8);
        let mut rx = events.subscribe();

        events.publish(SyncEvent::FamilySynced {
            store_id: StoreId::new(1),
            family: SyncFamily::Orders,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "family_synced");
        assert_eq!(event.store_id(), StoreId::new(1));
    }

    #[test]
    fn test_publish_without_subscribers() {
        BroadcastEvents::new(1).publish(SyncEvent::UninstallSuggested {
            store_id: StoreId::new(2),
            status: 402,
        });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(SyncEvent::UninstallSuggested {
            store_id: StoreId::new(2),
            status: 403,
        })
        .unwrap();
        assert_eq!(json["event"], "uninstall_suggested");
        assert_eq!(json["status"], 403);
    }
}
