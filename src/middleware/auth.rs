use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::{
    errors::AppError,
    handlers::AppState,
    models::{Identity, UserLedger},
    services::{Access, AdminAccess, MemberAccess},
};

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub uid: Uuid,
    pub email: String,
    pub session_id: Uuid,
}

impl AuthenticatedUser {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.uid,
            email: self.email.clone(),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Auth("Authentication required".to_string()))?;

        let claims = state
            .jwt
            .verify_access_token(token)
            .map_err(|_| AppError::Auth("Invalid or expired token".to_string()))?;
        let session_id = claims.session_id()?;

        if state.identity.is_revoked(session_id).await? {
            return Err(AppError::Auth("Session has been signed out".to_string()));
        }

        Ok(AuthenticatedUser {
            uid: claims.user_id()?,
            email: claims.email,
            session_id,
        })
    }
}

/// A signed-in caller with the capability their stored role grants.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: AuthenticatedUser,
    pub ledger: UserLedger,
    pub access: Access,
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        let identity = user.identity();
        let ledger = state.ledgers.ensure_ledger(&identity).await?;
        let access = Access::resolve(&identity, &ledger);

        Ok(Session { user, ledger, access })
    }
}

pub struct MemberSession(pub MemberAccess);

#[async_trait]
impl FromRequestParts<AppState> for MemberSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Session::from_request_parts(parts, state).await?.access {
            Access::Member(member) => Ok(MemberSession(member)),
            Access::Admin(_) => Err(AppError::Forbidden),
        }
    }
}

pub struct AdminSession(pub AdminAccess);

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Session::from_request_parts(parts, state).await?.access {
            Access::Admin(admin) => Ok(AdminSession(admin)),
            Access::Member(_) => Err(AppError::Forbidden),
        }
    }
}
