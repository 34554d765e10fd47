//! Built-in state transitions behind custom method names. Closed set: a
//! configured method whose name is not listed here is rejected, never
//! merged generically.

use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Suspend,
    Process,
    Ship,
    Cancel,
    Refund,
}

impl Transition {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "activate" => Transition::Activate,
            "suspend" => Transition::Suspend,
            "process" => Transition::Process,
            "ship" => Transition::Ship,
            "cancel" => Transition::Cancel,
            "refund" => Transition::Refund,
            _ => return None,
        })
    }

    pub fn status(self) -> &'static str {
        match self {
            Transition::Activate => "active",
            Transition::Suspend => "suspended",
            Transition::Process => "processing",
            Transition::Ship => "shipped",
            Transition::Cancel => "cancelled",
            Transition::Refund => "refunded",
        }
    }

    /// Field updates for this transition: validated caller params, the new
    /// status, and method-specific fields (caller values win where the field
    /// is caller-suppliable, e.g. `carrier`).
    pub fn apply(self, params: &HashMap<String, Value>, now: &str) -> HashMap<String, Value> {
        let mut updates = params.clone();
        updates.insert("status".into(), json!(self.status()));
        match self {
            Transition::Activate => {
                updates.insert("activatedAt".into(), json!(now));
            }
            Transition::Suspend => {
                updates.insert("suspendedAt".into(), json!(now));
            }
            Transition::Process => {
                updates.insert("processedAt".into(), json!(now));
            }
            Transition::Ship => {
                updates.insert("shippedDate".into(), json!(now));
                updates
                    .entry("carrier".into())
                    .or_insert_with(|| json!("standard"));
                updates
                    .entry("trackingNumber".into())
                    .or_insert_with(|| json!(generate_tracking_number()));
            }
            Transition::Cancel => {
                updates.insert("cancelledAt".into(), json!(now));
            }
            Transition::Refund => {
                updates.insert("refundedAt".into(), json!(now));
            }
        }
        updates
    }
}

fn generate_tracking_number() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("TRK-{}", &id[..12].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_not_transitions() {
        assert_eq!(Transition::from_name("ship"), Some(Transition::Ship));
        assert_eq!(Transition::from_name("archive"), None);
        assert_eq!(Transition::from_name(""), None);
    }

    #[test]
    fn ship_sets_tracking_fields_without_clobbering_params() {
        let mut params = HashMap::new();
        params.insert("carrier".to_string(), json!("ups"));
        let updates = Transition::Ship.apply(&params, "2026-08-07T10:00:00Z");
        assert_eq!(updates["status"], json!("shipped"));
        assert_eq!(updates["carrier"], json!("ups"));
        assert_eq!(updates["shippedDate"], json!("2026-08-07T10:00:00Z"));
        let tracking = updates["trackingNumber"].as_str().unwrap();
        assert!(tracking.starts_with("TRK-"));
    }

    #[test]
    fn cancel_records_timestamp_and_status() {
        let updates = Transition::Cancel.apply(&HashMap::new(), "2026-08-07T10:00:00Z");
        assert_eq!(updates["status"], json!("cancelled"));
        assert_eq!(updates["cancelledAt"], json!("2026-08-07T10:00:00Z"));
    }
}
