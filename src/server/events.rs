use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, warn};

use crate::player::RoomRegistry;

/// Traces every room event as JSON until the registry's event channel closes.
pub fn spawn_event_logger(registry: &RoomRegistry) -> JoinHandle<()> {
    let mut events = registry.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(target: "jellywave::events", "[{}] {}", event.room_id(), json),
                    Err(e) => warn!("Failed to serialize room event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
