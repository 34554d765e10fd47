//! Room-based pub/sub hub. One broadcast channel fans out to every
//! connected socket; each socket task filters by its joined-room set.
//! Sending never blocks and never fails the caller (fire-and-forget).

use serde_json::{json, Value};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub fn entity_room(entity: &str) -> String {
    format!("entity:{}", entity)
}

pub fn record_room(entity: &str, id: i64) -> String {
    format!("{}:{}", entity, id)
}

pub fn user_room(user_id: i64) -> String {
    format!("user:{}", user_id)
}

pub fn role_room(role: &str) -> String {
    format!("role:{}", role)
}

/// One event addressed to one or more rooms. A socket in any of the rooms
/// receives it once.
#[derive(Clone, Debug)]
pub struct RoomEvent {
    pub rooms: Vec<String>,
    pub event: String,
    pub data: Value,
    /// Sockets authenticated as this user are skipped (echo suppression).
    pub exclude_user: Option<i64>,
}

#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<RoomEvent>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Hub { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    pub fn emit(
        &self,
        rooms: Vec<String>,
        event: impl Into<String>,
        data: Value,
        exclude_user: Option<i64>,
    ) {
        // No receivers is not an error; events are best-effort.
        let _ = self.tx.send(RoomEvent {
            rooms,
            event: event.into(),
            data,
            exclude_user,
        });
    }

    pub fn emit_entity_created(&self, entity: &str, record: &Value) {
        self.emit(
            vec![entity_room(entity)],
            format!("{}:created", entity),
            record.clone(),
            None,
        );
    }

    pub fn emit_entity_updated(&self, entity: &str, id: i64, record: &Value, exclude_user: Option<i64>) {
        self.emit(
            vec![entity_room(entity), record_room(entity, id)],
            format!("{}:updated", entity),
            record.clone(),
            exclude_user,
        );
    }

    pub fn emit_entity_deleted(&self, entity: &str, id: i64, exclude_user: Option<i64>) {
        self.emit(
            vec![entity_room(entity), record_room(entity, id)],
            format!("{}:deleted", entity),
            json!({ "id": id }),
            exclude_user,
        );
    }

    pub fn emit_method_executed(
        &self,
        entity: &str,
        id: i64,
        method: &str,
        record: &Value,
        exclude_user: Option<i64>,
    ) {
        self.emit(
            vec![entity_room(entity), record_room(entity, id)],
            format!("{}:{}", entity, method),
            record.clone(),
            exclude_user,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_event_reaches_entity_room_subscriber() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();
        hub.emit_entity_created("order", &json!({"id": 1, "status": "pending"}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "order:created");
        assert_eq!(event.rooms, vec!["entity:order".to_string()]);
        assert_eq!(event.data["id"], json!(1));
    }

    #[tokio::test]
    async fn updated_event_targets_record_room_too() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();
        hub.emit_entity_updated("order", 7, &json!({"id": 7}), Some(42));
        let event = rx.recv().await.unwrap();
        assert!(event.rooms.contains(&"entity:order".to_string()));
        assert!(event.rooms.contains(&"order:7".to_string()));
        assert_eq!(event.exclude_user, Some(42));
    }

    #[tokio::test]
    async fn deleted_event_carries_only_the_id() {
        let hub = Hub::new();
        let mut rx = hub.subscribe();
        hub.emit_entity_deleted("order", 7, None);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.data, json!({"id": 7}));
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let hub = Hub::new();
        hub.emit_entity_created("order", &json!({}));
    }
}
