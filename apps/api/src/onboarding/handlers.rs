use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::identity::{IdentityEvent, RequestIdentity, USER_CREATED_EVENT, WEBHOOK_SECRET_HEADER};
use crate::onboarding::gate::{step_path, parse_step_slug, DASHBOARD_PATH};
use crate::onboarding::machine::{self, ResolvedStep, TOTAL_STEPS};
use crate::onboarding::provisioner;
use crate::state::AppState;

/// GET /onboarding
///
/// The bare dispatcher: never renders content, always redirects to the
/// concrete current-step path (or to the dashboard once complete).
pub async fn handle_dispatch(
    State(state): State<AppState>,
    RequestIdentity(identity_id): RequestIdentity,
) -> Result<Redirect, AppError> {
    let profile = provisioner::ensure(state.store.as_ref(), &identity_id).await?;
    let target = match machine::resolve_current_step(&profile) {
        ResolvedStep::Step(step) => step_path(step),
        ResolvedStep::Complete => DASHBOARD_PATH.to_string(),
    };
    Ok(Redirect::temporary(&target))
}

/// GET /onboarding/step-{k}
///
/// Step page data: the step number and title, plus any previously saved
/// payload so a returning user resumes with their answers intact. The gate
/// has already pinned navigation to the current step.
pub async fn handle_step_page(
    State(state): State<AppState>,
    RequestIdentity(identity_id): RequestIdentity,
    Path(slug): Path<String>,
) -> Result<Json<Value>, AppError> {
    let step = parse_step_slug(&slug)
        .filter(|k| (1..=TOTAL_STEPS).contains(k))
        .ok_or_else(|| AppError::NotFound(format!("No onboarding step at '{slug}'")))?;
    let profile = provisioner::ensure(state.store.as_ref(), &identity_id).await?;

    Ok(Json(json!({
        "step": step,
        "title": machine::step_title(step),
        "total_steps": TOTAL_STEPS,
        "saved": profile.step_payload(step),
    })))
}

/// POST /onboarding/step-{k}
///
/// The submission boundary: applies the step-completion transition and
/// sends the client on to the next step (303, so the browser follows with a
/// GET). A stale or skipped-ahead submission surfaces as 409 STALE_STEP.
pub async fn handle_step_submit(
    State(state): State<AppState>,
    RequestIdentity(identity_id): RequestIdentity,
    Path(slug): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Redirect, AppError> {
    let step = parse_step_slug(&slug)
        .ok_or_else(|| AppError::NotFound(format!("No onboarding step at '{slug}'")))?;

    provisioner::ensure(state.store.as_ref(), &identity_id).await?;
    let profile = machine::complete_step(state.store.as_ref(), &identity_id, step, payload).await?;

    let next = match machine::resolve_current_step(&profile) {
        ResolvedStep::Step(next_step) => step_path(next_step),
        ResolvedStep::Complete => DASHBOARD_PATH.to_string(),
    };
    Ok(Redirect::to(&next))
}

/// GET /api/v1/onboarding/status
///
/// Resolved flow position for client-side routing. Provisions on first
/// touch like every other authenticated entry point.
pub async fn handle_status(
    State(state): State<AppState>,
    RequestIdentity(identity_id): RequestIdentity,
) -> Result<Json<Value>, AppError> {
    let profile = provisioner::ensure(state.store.as_ref(), &identity_id).await?;
    let body = match machine::resolve_current_step(&profile) {
        ResolvedStep::Step(step) => json!({
            "completed": false,
            "current_step": step,
            "path": step_path(step),
        }),
        ResolvedStep::Complete => json!({
            "completed": true,
            "current_step": Value::Null,
            "path": DASHBOARD_PATH,
        }),
    };
    Ok(Json(body))
}

/// GET /dashboard
///
/// Minimal authenticated landing; the gate guarantees only fully onboarded
/// identities reach it.
pub async fn handle_dashboard(
    RequestIdentity(identity_id): RequestIdentity,
) -> Result<Json<Value>, AppError> {
    Ok(Json(json!({
        "identity_id": identity_id,
        "page": "dashboard",
    })))
}

/// POST /api/v1/identity/webhook
///
/// Out-of-band signup notification from the identity provider. Pre-warms
/// the profile row; delivery is best-effort and the system is correct if
/// this never fires, so unknown event kinds are acknowledged and dropped.
pub async fn handle_identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<IdentityEvent>,
) -> Result<StatusCode, AppError> {
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if secret != Some(state.config.identity_webhook_secret.as_str()) {
        return Err(AppError::Unauthorized);
    }

    if event.kind == USER_CREATED_EVENT {
        provisioner::ensure(state.store.as_ref(), &event.data.id).await?;
        info!(identity_id = %event.data.id, "pre-warmed profile from signup webhook");
    }
    Ok(StatusCode::NO_CONTENT)
}
