//! Bearer-token sessions and the request extractor built on them.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use bestflow_shared::UserRole;

use crate::config::DevUser;
use crate::problem::ApiProblem;
use crate::state::AppState;

/// Who a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: UserRole,
}

/// Issued bearer tokens. Issuance itself happens elsewhere; this only resolves.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn from_dev_users(users: &[DevUser]) -> Self {
        let registry = Self::default();
        for user in users {
            registry.insert(&user.token, &user.user_id, user.role);
        }
        registry
    }

    pub fn insert(&self, token: &str, user_id: &str, role: UserRole) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                token.to_string(),
                Session {
                    user_id: user_id.to_string(),
                    role,
                },
            );
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }

    /// Role of a user with at least one live session.
    pub fn role_of(&self, user_id: &str) -> Option<UserRole> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|s| s.user_id == user_id)
            .map(|s| s.role)
    }

    pub fn resolve(&self, token: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }
}

/// Extractor for requests authenticated with `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Session);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiProblem;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiProblem::unauthorized("Missing bearer token"))?;

        app_state
            .sessions
            .resolve(token)
            .map(AuthUser)
            .ok_or_else(|| {
                tracing::debug!("rejected unknown bearer token");
                ApiProblem::unauthorized("Could not validate credentials")
            })
    }
}
