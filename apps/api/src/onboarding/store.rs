//! Profile persistence — trait-based so the Postgres backend can be swapped
//! for the in-memory one in tests without touching caller code.
//!
//! The store is deliberately dumb: it exposes atomic primitives
//! (insert-if-absent, compare-and-set update) and leaves all transition
//! logic to the state machine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::Profile;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile for an identity, if one exists.
    async fn get(&self, identity_id: &str) -> Result<Option<Profile>, AppError>;

    /// Create a fresh profile at step 1 unless one already exists.
    /// Concurrent callers for the same identity all receive the same row;
    /// a duplicate-key race never surfaces as an error.
    async fn create_if_absent(&self, identity_id: &str) -> Result<Profile, AppError>;

    /// Compare-and-set step completion: persists `payload` under
    /// `completed_step` and advances to `next_step` only if the stored
    /// `onboarding_step` still equals `completed_step`. Returns `None` when
    /// the CAS loses (stale or duplicate submission), leaving the row
    /// untouched.
    async fn update_step(
        &self,
        identity_id: &str,
        completed_step: u32,
        payload: &Value,
        next_step: u32,
        completed: bool,
    ) -> Result<Option<Profile>, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres backend
// ────────────────────────────────────────────────────────────────────────────

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, identity_id: &str) -> Result<Option<Profile>, AppError> {
        let profile: Option<Profile> =
            sqlx::query_as("SELECT * FROM profiles WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn create_if_absent(&self, identity_id: &str) -> Result<Profile, AppError> {
        let inserted: Option<Profile> = sqlx::query_as(
            r#"
            INSERT INTO profiles (id, identity_id)
            VALUES ($1, $2)
            ON CONFLICT (identity_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(profile) = inserted {
            return Ok(profile);
        }

        // Lost the insert race; the winner's row must exist now.
        self.get(identity_id).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "profile for {identity_id} vanished after conflicting insert"
            ))
        })
    }

    async fn update_step(
        &self,
        identity_id: &str,
        completed_step: u32,
        payload: &Value,
        next_step: u32,
        completed: bool,
    ) -> Result<Option<Profile>, AppError> {
        // The WHERE clause is the compare-and-set: a stale submission
        // matches zero rows and RETURNING yields nothing.
        let updated: Option<Profile> = sqlx::query_as(
            r#"
            UPDATE profiles
            SET step_data = jsonb_set(step_data, $3::text[], $4),
                onboarding_step = $5,
                onboarding_completed = onboarding_completed OR $6,
                updated_at = now()
            WHERE identity_id = $1
              AND onboarding_step = $2
              AND onboarding_completed = FALSE
            RETURNING *
            "#,
        )
        .bind(identity_id)
        .bind(completed_step as i32)
        .bind(vec![completed_step.to_string()])
        .bind(payload)
        .bind(next_step as i32)
        .bind(completed)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory backend (tests, local development)
// ────────────────────────────────────────────────────────────────────────────

/// Same contract as `PgProfileStore`, backed by a mutex-guarded map. The
/// lock is held only across synchronous map operations, never across an
/// await point.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, identity_id: &str) -> Result<Option<Profile>, AppError> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.get(identity_id).cloned())
    }

    async fn create_if_absent(&self, identity_id: &str) -> Result<Profile, AppError> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .entry(identity_id.to_string())
            .or_insert_with(|| Profile::new(identity_id));
        Ok(profile.clone())
    }

    async fn update_step(
        &self,
        identity_id: &str,
        completed_step: u32,
        payload: &Value,
        next_step: u32,
        completed: bool,
    ) -> Result<Option<Profile>, AppError> {
        let mut profiles = self.profiles.lock().unwrap();
        let Some(profile) = profiles.get_mut(identity_id) else {
            return Ok(None);
        };
        if profile.onboarding_completed || profile.onboarding_step != completed_step as i32 {
            return Ok(None);
        }
        profile.step_data[completed_step.to_string()] = payload.clone();
        profile.onboarding_step = next_step as i32;
        profile.onboarding_completed = profile.onboarding_completed || completed;
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }
}
