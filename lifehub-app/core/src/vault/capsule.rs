use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A private two-party relationship space.
///
/// The partner slot stays empty until the invited party joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capsule {
    pub id: String,
    pub owner_id: String,
    pub partner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Capsule {
    pub fn is_party(&self, party_id: &str) -> bool {
        self.owner_id == party_id || self.partner_id.as_deref() == Some(party_id)
    }

    /// The other party, if `party_id` is one of the two and a partner has joined.
    pub fn counterpart_of(&self, party_id: &str) -> Option<&str> {
        if self.owner_id == party_id {
            self.partner_id.as_deref()
        } else if self.partner_id.as_deref() == Some(party_id) {
            Some(self.owner_id.as_str())
        } else {
            None
        }
    }
}
