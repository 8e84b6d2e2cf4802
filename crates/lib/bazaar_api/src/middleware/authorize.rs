//! Per-route authorization guards.
//!
//! A guard carries a parsed requirement such as
//! `"permission:todo.items.create;role:Admin"` and checks it against the
//! caller's cached authorization data. Runs after [`super::auth::require_auth`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};
use bazaar_core::authz::{AuthorizationRequirement, RequirementFailure};
use tracing::{debug, warn};

use super::auth::AuthenticatedUser;
use crate::AppState;
use crate::error::AppError;

#[derive(Clone)]
pub struct Guard {
    state: AppState,
    requirement: Arc<AuthorizationRequirement>,
}

impl Guard {
    pub fn new(state: &AppState, requirement: &str) -> Self {
        Self {
            state: state.clone(),
            requirement: Arc::new(AuthorizationRequirement::parse(requirement)),
        }
    }
}

/// Wrap `route` so it only runs when `requirement` is met.
pub fn guarded(
    route: MethodRouter<AppState>,
    state: &AppState,
    requirement: &str,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        Guard::new(state, requirement),
        authorize,
    ))
}

pub async fn authorize(
    State(guard): State<Guard>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.user_id)
        .ok_or_else(|| AppError::unauthorized("auth.missing_token", "Authentication required"))?;

    let data = guard
        .state
        .authz
        .get_user_authorization(user_id)
        .await
        .map_err(bazaar_core::error::DomainError::from)?;

    match guard.requirement.evaluate(data.as_ref()) {
        Ok(()) => Ok(next.run(request).await),
        Err(RequirementFailure::Unauthenticated) => {
            warn!(user_id = %user_id, "Token subject has no account");
            Err(AppError::unauthorized("auth.user_not_found", "Authentication required"))
        }
        Err(failure) => {
            debug!(user_id = %user_id, requirement = %guard.requirement, %failure, "Access denied");
            Err(AppError::forbidden("auth.forbidden", "You do not have access to this resource"))
        }
    }
}
