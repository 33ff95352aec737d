use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::identity::{Identity, Role};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// Bearer-token extractor. Every `/api/rides` handler takes one; role and
/// party checks happen in the handler against the ride record.
pub struct AuthIdentity(pub Identity);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("malformed authorization header".to_string()))?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("invalid token".to_string()))?;

        let id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::Unauthorized("invalid subject claim".to_string()))?;

        Ok(AuthIdentity(Identity {
            role: data.claims.role,
            id,
        }))
    }
}

impl AuthIdentity {
    /// Role gate for handlers: wrong role is a 403, per the REST contract.
    pub fn require(self, role: Role) -> Result<Uuid, AppError> {
        if self.0.role != role {
            return Err(AppError::Forbidden(format!(
                "requires {} role",
                role.as_str()
            )));
        }
        Ok(self.0.id)
    }
}

/// Mints a bearer token for an identity. The platform's account service owns
/// real token issuance; this exists for local tooling and tests.
pub fn issue_token(secret: &str, role: Role, id: Uuid) -> Result<String, AppError> {
    let claims = Claims {
        sub: id.to_string(),
        role,
        exp: (Utc::now() + Duration::hours(12)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(format!("failed to sign token: {err}")))
}
