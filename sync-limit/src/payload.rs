use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Per-client values a node reports as authoritative when it rejects a
/// peer's reconciliation data.
pub type Conflicts = HashMap<String, u64>;

/// One client's entry in a reconciliation payload.
///
/// `current` is the sender's committed count at snapshot time and `delta`
/// the increments it accrued locally since its last merge. On the wire the
/// delta travels as `new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: String,
    pub current: u64,
    #[serde(rename = "new")]
    pub delta: u64,
}

/// The body POSTed to a peer's `/sync` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Sender's wall-clock second-of-minute at send time.
    pub sec: u32,
    pub values: Vec<ReconciliationRecord>,
}

impl SyncRequest {
    pub fn new(sec: u32, values: Vec<ReconciliationRecord>) -> Self {
        Self { sec, values }
    }

    /// Best-effort staleness hint: the request is considered to belong to a
    /// window that has already elapsed when the sender's second is ahead of
    /// ours. This misfires across a minute wraparound and under clock skew,
    /// so it must never be relied upon for correctness.
    pub fn is_stale(&self, receiver_sec: u32) -> bool {
        self.sec > receiver_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_uses_the_wire_field_names() {
        let req = SyncRequest::new(
            12,
            vec![ReconciliationRecord {
                id: "alice".to_string(),
                current: 3,
                delta: 2,
            }],
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sec": 12,
                "values": [{ "id": "alice", "current": 3, "new": 2 }]
            })
        );
    }

    #[test]
    fn it_decodes_a_conflict_body() {
        let conflicts: Conflicts = serde_json::from_str(r#"{"alice":5,"bob":7}"#).unwrap();
        assert_eq!(conflicts.get("alice"), Some(&5));
        assert_eq!(conflicts.get("bob"), Some(&7));
    }

    #[test]
    fn test_staleness_hint() {
        let req = SyncRequest::new(30, vec![]);
        assert!(!req.is_stale(30));
        assert!(!req.is_stale(45));
        assert!(req.is_stale(29));
        // Wraparound: sent at :59, received at :00 of the next minute.
        assert!(SyncRequest::new(59, vec![]).is_stale(0));
    }
}
