//! Access-control gate for protected routes.
//!
//! The decision logic is a pure function over (path, resolved step) returning
//! an explicit `Decision` value; the async shell does the store round-trip
//! and the middleware performs the actual redirect. Nothing here advances a
//! step — visiting a URL never changes onboarding state.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::errors::AppError;
use crate::identity::identity_from_headers;
use crate::onboarding::machine::{self, ResolvedStep};
use crate::onboarding::provisioner;
use crate::onboarding::store::ProfileStore;
use crate::state::AppState;

pub const SIGN_IN_PATH: &str = "/sign-in";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const ONBOARDING_PATH: &str = "/onboarding";

const PROTECTED_PREFIXES: [&str; 4] = ["/dashboard", "/onboarding", "/applications", "/profile"];

/// Path for a concrete onboarding step.
pub fn step_path(step: u32) -> String {
    format!("{ONBOARDING_PATH}/step-{step}")
}

/// Parses a `step-{k}` path segment.
pub fn parse_step_slug(slug: &str) -> Option<u32> {
    slug.strip_prefix("step-")?.parse().ok()
}

/// Does this request path require an authorization decision?
pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.strip_prefix(prefix).is_some_and(|r| r.starts_with('/')))
}

pub fn is_onboarding_path(path: &str) -> bool {
    path == ONBOARDING_PATH
        || path
            .strip_prefix(ONBOARDING_PATH)
            .is_some_and(|r| r.starts_with('/'))
}

/// Outcome of an authorization check, consumed by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(String),
}

/// Pure routing decision for an authenticated identity whose profile
/// resolved to `resolved`. The bare onboarding path is always allowed
/// through for in-progress profiles — its handler never renders content,
/// it redirects to the concrete step path.
pub fn decide(path: &str, resolved: ResolvedStep) -> Decision {
    match resolved {
        ResolvedStep::Complete => {
            if is_onboarding_path(path) {
                Decision::Redirect(DASHBOARD_PATH.to_string())
            } else {
                Decision::Allow
            }
        }
        ResolvedStep::Step(step) => {
            let current = step_path(step);
            if path == ONBOARDING_PATH || path == current {
                Decision::Allow
            } else {
                Decision::Redirect(current)
            }
        }
    }
}

/// The gate itself: resolves identity and profile state, then delegates to
/// the pure `decide`.
pub struct StepGate {
    store: Arc<dyn ProfileStore>,
}

impl StepGate {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Authorization check for one request. Provisions the profile on first
    /// authenticated touch, so a missed signup webhook never strands a user.
    pub async fn authorize(
        &self,
        identity: Option<&str>,
        path: &str,
    ) -> Result<Decision, AppError> {
        if !is_protected(path) {
            return Ok(Decision::Allow);
        }
        let Some(identity_id) = identity else {
            return Ok(Decision::Redirect(SIGN_IN_PATH.to_string()));
        };
        let profile = provisioner::ensure(self.store.as_ref(), identity_id).await?;
        Ok(decide(path, machine::resolve_current_step(&profile)))
    }
}

/// Router middleware enforcing the gate on navigations. Form submissions
/// (non-GET) pass through: their handlers enforce the step precondition at
/// write time via the store CAS, and redirecting a POST would replay its
/// body against the wrong step endpoint.
pub async fn gate_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Ok(next.run(req).await);
    }
    let path = req.uri().path().to_string();
    let identity = identity_from_headers(req.headers());

    let gate = StepGate::new(state.store.clone());
    match gate.authorize(identity.as_deref(), &path).await? {
        Decision::Allow => Ok(next.run(req).await),
        Decision::Redirect(to) => Ok(Redirect::temporary(&to).into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::machine::TOTAL_STEPS;
    use crate::onboarding::store::MemoryProfileStore;
    use serde_json::json;

    #[test]
    fn protected_path_predicate() {
        assert!(is_protected("/dashboard"));
        assert!(is_protected("/dashboard/jobs"));
        assert!(is_protected("/onboarding/step-2"));
        assert!(is_protected("/applications"));
        assert!(!is_protected("/"));
        assert!(!is_protected("/health"));
        assert!(!is_protected("/sign-in"));
        assert!(!is_protected("/dashboards")); // prefix match is per-segment
    }

    #[test]
    fn step_slug_parsing() {
        assert_eq!(parse_step_slug("step-1"), Some(1));
        assert_eq!(parse_step_slug("step-5"), Some(5));
        assert_eq!(parse_step_slug("step-"), None);
        assert_eq!(parse_step_slug("settings"), None);
    }

    #[test]
    fn in_progress_profile_is_pinned_to_its_current_step() {
        let resolved = ResolvedStep::Step(3);
        assert_eq!(
            decide("/dashboard", resolved),
            Decision::Redirect("/onboarding/step-3".to_string())
        );
        assert_eq!(
            decide("/onboarding/step-1", resolved),
            Decision::Redirect("/onboarding/step-3".to_string())
        );
        assert_eq!(decide("/onboarding/step-3", resolved), Decision::Allow);
        // Bare dispatcher passes through; it redirects itself.
        assert_eq!(decide("/onboarding", resolved), Decision::Allow);
    }

    #[test]
    fn completed_profile_never_sees_onboarding() {
        assert_eq!(
            decide("/onboarding/step-2", ResolvedStep::Complete),
            Decision::Redirect(DASHBOARD_PATH.to_string())
        );
        assert_eq!(
            decide("/onboarding", ResolvedStep::Complete),
            Decision::Redirect(DASHBOARD_PATH.to_string())
        );
        assert_eq!(decide("/dashboard", ResolvedStep::Complete), Decision::Allow);
    }

    #[tokio::test]
    async fn no_identity_redirects_to_sign_in() {
        let gate = StepGate::new(Arc::new(MemoryProfileStore::new()));
        assert_eq!(
            gate.authorize(None, "/dashboard").await.unwrap(),
            Decision::Redirect(SIGN_IN_PATH.to_string())
        );
        // Public paths need no identity.
        assert_eq!(
            gate.authorize(None, "/health").await.unwrap(),
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn first_touch_provisions_and_routes_to_step_one() {
        let store = Arc::new(MemoryProfileStore::new());
        let gate = StepGate::new(store.clone());

        let decision = gate.authorize(Some("user_1"), "/dashboard").await.unwrap();
        assert_eq!(decision, Decision::Redirect("/onboarding/step-1".to_string()));

        // The profile now exists without any webhook having fired.
        let profile = store.get("user_1").await.unwrap().unwrap();
        assert_eq!(profile.onboarding_step, 1);
    }

    #[tokio::test]
    async fn completed_identity_is_allowed_through() {
        let store = Arc::new(MemoryProfileStore::new());
        store.create_if_absent("user_1").await.unwrap();
        for k in 1..=TOTAL_STEPS {
            store
                .update_step("user_1", k, &json!({}), k + 1, k == TOTAL_STEPS)
                .await
                .unwrap();
        }
        let gate = StepGate::new(store);
        assert_eq!(
            gate.authorize(Some("user_1"), "/dashboard").await.unwrap(),
            Decision::Allow
        );
        assert_eq!(
            gate.authorize(Some("user_1"), "/onboarding/step-2")
                .await
                .unwrap(),
            Decision::Redirect(DASHBOARD_PATH.to_string())
        );
    }
}
