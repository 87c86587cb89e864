use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;

/// The persisted onboarding record for one identity. One row per
/// `identity_id`; created on first authenticated touch of the onboarding
/// surface, mutated only by step completion, never deleted by this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    /// Opaque key from the identity provider. Unique, immutable once set.
    pub identity_id: String,
    /// Lowest incomplete step; `TOTAL_STEPS + 1` once the flow is complete.
    pub onboarding_step: i32,
    pub onboarding_completed: bool,
    /// Per-step payloads keyed by step number ("1".."5"). Opaque to the
    /// state machine; field-level validation belongs to each step's form.
    pub step_data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A fresh profile at step 1 with no step data.
    pub fn new(identity_id: &str) -> Self {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            identity_id: identity_id.to_string(),
            onboarding_step: 1,
            onboarding_completed: false,
            step_data: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// The payload saved for a completed step, if any.
    pub fn step_payload(&self, step: u32) -> Option<&Value> {
        self.step_data.get(step.to_string())
    }
}
