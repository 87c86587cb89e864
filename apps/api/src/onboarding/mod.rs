//! The onboarding progression engine: a server-validated, resumable,
//! multi-step profile-completion workflow gating access to the rest of the
//! product.
//!
//! Layers, leaf to root: `store` (one profile row per identity),
//! `provisioner` (profile exists before any onboarding logic runs),
//! `machine` (step sequence and transitions), `gate` (per-request routing
//! decision consumed by the middleware).

pub mod gate;
pub mod handlers;
pub mod machine;
pub mod provisioner;
pub mod store;
