use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownPeriod {
    pub id: String,
    pub license_id: String,
    pub started_at: i64,
    pub ends_at: i64,
    pub active: bool,
}

impl CooldownPeriod {
    /// A cooldown only constrains activations while flagged active and not yet ended.
    pub fn is_live(&self, now: i64) -> bool {
        self.active && self.ends_at > now
    }
}
