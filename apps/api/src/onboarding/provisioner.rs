//! Compensating profile initializer.
//!
//! The identity provider emits an out-of-band "user.created" notification
//! that pre-warms the profile row, but delivery is best-effort and may lag
//! or never happen. `ensure` guarantees a profile exists before any
//! onboarding logic runs, treating the webhook as an optimization rather
//! than a dependency.

use tracing::info;

use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::onboarding::store::ProfileStore;

/// Returns the profile for `identity_id`, creating it at step 1 if absent.
/// Idempotent and race-safe: concurrent first-touch callers all read back
/// the single row the store's atomic insert produced.
pub async fn ensure(store: &dyn ProfileStore, identity_id: &str) -> Result<Profile, AppError> {
    if let Some(profile) = store.get(identity_id).await? {
        return Ok(profile);
    }
    let profile = store.create_if_absent(identity_id).await?;
    info!(identity_id, "provisioned onboarding profile");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::store::MemoryProfileStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn ensure_creates_exactly_one_profile() {
        let store = MemoryProfileStore::new();
        let first = ensure(&store, "user_1").await.unwrap();
        let second = ensure(&store, "user_1").await.unwrap();
        let third = ensure(&store, "user_1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.id, third.id);
        assert_eq!(third.onboarding_step, 1);
    }

    #[tokio::test]
    async fn concurrent_first_touch_yields_one_row() {
        let store = Arc::new(MemoryProfileStore::new());
        let a = {
            let store = store.clone();
            tokio::spawn(async move { ensure(store.as_ref(), "user_1").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { ensure(store.as_ref(), "user_1").await })
        };
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn ensure_preserves_existing_progress() {
        let store = MemoryProfileStore::new();
        ensure(&store, "user_1").await.unwrap();
        store
            .update_step("user_1", 1, &serde_json::json!({}), 2, false)
            .await
            .unwrap();
        let profile = ensure(&store, "user_1").await.unwrap();
        assert_eq!(profile.onboarding_step, 2);
    }
}
