//! Per-request user context and the "request outstanding" flag.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::errors::AppError;

pub const USER_HEADER: &str = "x-user-id";

/// Identity of the caller, as issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Unauthenticated)?;
        Ok(CurrentUser { id: id.to_string() })
    }
}

/// Users that currently have a chat request in flight.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    /// Marks the user busy. Fails if a request is already outstanding.
    pub fn begin(&self, user_id: &str) -> Result<RequestGuard, AppError> {
        let mut busy = self.busy.lock().unwrap_or_else(|p| p.into_inner());
        if !busy.insert(user_id.to_string()) {
            return Err(AppError::RequestInFlight(user_id.to_string()));
        }
        Ok(RequestGuard { registry: self.clone(), user_id: user_id.to_string() })
    }

    pub fn is_busy(&self, user_id: &str) -> bool {
        self.busy.lock().unwrap_or_else(|p| p.into_inner()).contains(user_id)
    }
}

/// Clears the busy flag on drop, whatever the outcome of the request.
#[derive(Debug)]
pub struct RequestGuard {
    registry: SessionRegistry,
    user_id: String,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let mut busy = self.registry.busy.lock().unwrap_or_else(|p| p.into_inner());
        busy.remove(&self.user_id);
    }
}
