//! The onboarding state machine: step sequence, canonical current-step
//! resolution, and the single step-advancing transition.
//!
//! Routing and submission handling both read through `resolve_current_step`,
//! so a user landing on the bare onboarding path, retrying a stale step URL,
//! or refreshing mid-flow is always routed to the one canonical step.
//! Completion (never a URL visit) is the only step-advancing event.

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::onboarding::store::ProfileStore;

/// Number of onboarding steps. A profile with `onboarding_step` past this
/// value has finished the flow.
pub const TOTAL_STEPS: u32 = 5;

/// Display titles, in step order.
pub fn step_title(step: u32) -> &'static str {
    match step {
        1 => "Basics",
        2 => "Background",
        3 => "Location",
        4 => "Preferences",
        5 => "Verification",
        _ => "Unknown",
    }
}

/// Canonical position of a profile in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedStep {
    Step(u32),
    Complete,
}

impl std::fmt::Display for ResolvedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedStep::Step(k) => write!(f, "step {k}"),
            ResolvedStep::Complete => write!(f, "complete"),
        }
    }
}

/// Computes the canonical current step from stored profile state. Pure and
/// side-effect-free apart from the anomaly log; safe to call on every
/// request.
///
/// A stored step outside `[1, TOTAL_STEPS]` on an incomplete profile is
/// clamped rather than trusted, so a corrupted row degrades to a valid step
/// instead of an out-of-range path.
pub fn resolve_current_step(profile: &Profile) -> ResolvedStep {
    if profile.onboarding_completed {
        return ResolvedStep::Complete;
    }
    let stored = profile.onboarding_step;
    if stored < 1 || stored > TOTAL_STEPS as i32 {
        warn!(
            identity_id = %profile.identity_id,
            stored,
            "stored onboarding_step out of range, clamping"
        );
        return ResolvedStep::Step(stored.clamp(1, TOTAL_STEPS as i32) as u32);
    }
    ResolvedStep::Step(stored as u32)
}

/// Applies the step-completion transition for `identity_id`.
///
/// Precondition: `step` is the profile's current step; this is enforced at
/// write time by the store's compare-and-set, so racing duplicate
/// submissions are rejected rather than double-applied. Completing the
/// final step moves the profile to the terminal completed state, a one-way
/// transition this machine never reverses.
pub async fn complete_step(
    store: &dyn ProfileStore,
    identity_id: &str,
    step: u32,
    payload: Value,
) -> Result<Profile, AppError> {
    if !(1..=TOTAL_STEPS).contains(&step) {
        return Err(AppError::Validation(format!(
            "step must be between 1 and {TOTAL_STEPS}, got {step}"
        )));
    }
    if !payload.is_object() {
        return Err(AppError::Validation(
            "step payload must be a JSON object".to_string(),
        ));
    }

    let completed = step == TOTAL_STEPS;
    let updated = store
        .update_step(identity_id, step, &payload, step + 1, completed)
        .await?;

    match updated {
        Some(profile) => {
            info!(
                identity_id,
                step,
                completed = profile.onboarding_completed,
                "onboarding step completed"
            );
            Ok(profile)
        }
        None => {
            // CAS lost: report where the profile actually is so the client
            // can re-resolve and re-render the correct step.
            let current = match store.get(identity_id).await? {
                Some(profile) => resolve_current_step(&profile).to_string(),
                None => "unprovisioned".to_string(),
            };
            Err(AppError::StaleStep {
                submitted: step,
                current,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::store::MemoryProfileStore;
    use serde_json::json;

    fn corrupted_profile(step: i32) -> Profile {
        let mut profile = Profile::new("user_1");
        profile.onboarding_step = step;
        profile
    }

    #[tokio::test]
    async fn each_step_advances_by_one() {
        let store = MemoryProfileStore::new();
        store.create_if_absent("user_1").await.unwrap();

        for k in 1..TOTAL_STEPS {
            let payload = json!({"step": k});
            let profile = complete_step(&store, "user_1", k, payload.clone())
                .await
                .unwrap();
            assert_eq!(profile.onboarding_step, (k + 1) as i32);
            assert!(!profile.onboarding_completed);
            assert_eq!(profile.step_payload(k), Some(&payload));
        }
    }

    #[tokio::test]
    async fn final_step_completes_the_flow() {
        let store = MemoryProfileStore::new();
        store.create_if_absent("user_1").await.unwrap();
        for k in 1..TOTAL_STEPS {
            complete_step(&store, "user_1", k, json!({})).await.unwrap();
        }

        let profile = complete_step(&store, "user_1", TOTAL_STEPS, json!({"id_doc": "ok"}))
            .await
            .unwrap();
        assert!(profile.onboarding_completed);
        assert_eq!(profile.onboarding_step, (TOTAL_STEPS + 1) as i32);
        assert_eq!(resolve_current_step(&profile), ResolvedStep::Complete);
    }

    #[tokio::test]
    async fn stale_submission_is_rejected_and_leaves_profile_unchanged() {
        let store = MemoryProfileStore::new();
        store.create_if_absent("user_1").await.unwrap();
        complete_step(&store, "user_1", 1, json!({"name": "Ada"}))
            .await
            .unwrap();

        let before = store.get("user_1").await.unwrap().unwrap();

        // Retrying step 1 after it advanced.
        let err = complete_step(&store, "user_1", 1, json!({"name": "Bob"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StaleStep { submitted: 1, .. }));

        // Skipping ahead to step 3.
        let err = complete_step(&store, "user_1", 3, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StaleStep { submitted: 3, .. }));

        let after = store.get("user_1").await.unwrap().unwrap();
        assert_eq!(after.onboarding_step, before.onboarding_step);
        assert_eq!(after.step_data, before.step_data);
        assert_eq!(after.step_payload(1), Some(&json!({"name": "Ada"})));
    }

    #[tokio::test]
    async fn out_of_range_step_number_is_a_validation_error() {
        let store = MemoryProfileStore::new();
        store.create_if_absent("user_1").await.unwrap();
        assert!(matches!(
            complete_step(&store, "user_1", 0, json!({})).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            complete_step(&store, "user_1", TOTAL_STEPS + 1, json!({})).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn non_object_payload_is_rejected() {
        let store = MemoryProfileStore::new();
        store.create_if_absent("user_1").await.unwrap();
        assert!(matches!(
            complete_step(&store, "user_1", 1, json!("just a string")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn resolver_clamps_corrupted_step_values() {
        assert_eq!(
            resolve_current_step(&corrupted_profile(99)),
            ResolvedStep::Step(TOTAL_STEPS)
        );
        assert_eq!(
            resolve_current_step(&corrupted_profile(-3)),
            ResolvedStep::Step(1)
        );
        assert_eq!(
            resolve_current_step(&corrupted_profile(0)),
            ResolvedStep::Step(1)
        );
    }

    #[test]
    fn completed_flag_wins_over_stored_step() {
        let mut profile = Profile::new("user_1");
        profile.onboarding_completed = true;
        profile.onboarding_step = 2; // inconsistent row; completed flag is authoritative
        assert_eq!(resolve_current_step(&profile), ResolvedStep::Complete);
    }

    #[tokio::test]
    async fn step_never_decreases() {
        let store = MemoryProfileStore::new();
        store.create_if_absent("user_1").await.unwrap();
        let mut highest = 1;
        for k in [1u32, 1, 2, 1, 3, 2, 3, 4, 5, 5] {
            let _ = complete_step(&store, "user_1", k, json!({})).await;
            let step = store.get("user_1").await.unwrap().unwrap().onboarding_step;
            assert!(step >= highest);
            highest = step;
        }
        let profile = store.get("user_1").await.unwrap().unwrap();
        assert!(profile.onboarding_completed);
    }
}
