// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{db, error::AppError, state::AppState, utils::cookie::session_token};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID.
    pub sub: String,
    /// Issued-at as Unix timestamp.
    pub iat: usize,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs a session token for the user, valid for `expiration_seconds`.
pub fn sign_jwt(user_id: &str, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_owned(),
        iat: now,
        exp: now + expiration_seconds as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies signature and expiry of a session token.
///
/// Returns the `Claims` if valid, otherwise an `AppError::AuthError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Unauthorized access. Invalid token.".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Access guard.
///
/// Reads the session cookie, verifies it and loads the user it names
/// (password excluded). The resolved `UserProfile` is injected into the
/// request extensions for handlers.
///
/// * no cookie -> 401
/// * bad signature / expired -> 401
/// * user gone -> 404
/// * store failure -> 500
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(req.headers()).ok_or_else(|| {
        AppError::AuthError("Unauthorized access. No token provided.".to_string())
    })?;

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;

    let user = db::fetch_profile(&state.pool, &claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Access guard failed to load user {}: {:?}", claims.sub, e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let token = sign_jwt("user-1", "secret", 60).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt("user-1", "secret", 60).unwrap();
        assert!(matches!(verify_jwt(&token, "other"), Err(AppError::AuthError(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let past = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize - 3600;
        let claims = Claims {
            sub: "user-1".into(),
            iat: past - 60,
            exp: past,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(verify_jwt(&token, "secret"), Err(AppError::AuthError(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify_jwt("not.a.token", "secret").is_err());
    }
}
