use argon2::{Argon2, PasswordHash, PasswordVerifier};
use lambda_http::{http::StatusCode, Body, Response};
use serde::Deserialize;

use crate::access::{Actor, RawSession};
use crate::error::AppError;
use crate::ncdb::T_USERS;
use crate::responses;
use crate::session::{self, SessionClaims};
use crate::types::UserRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Authenticate against the NCDB users table and issue a session.
/// Every failure path returns the same generic 401 so the response never
/// reveals whether the account exists.
pub async fn login(state: &AppState, body: &[u8]) -> Result<Response<Body>, AppError> {
    let request: LoginRequest =
        serde_json::from_slice(body).map_err(AppError::from_body_parse)?;

    let email = request.email.trim().to_ascii_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::ValidationFailed(
            "Email and password are required".to_string(),
        ));
    }

    tracing::info!("Login attempt for {}", email);

    let users: Vec<UserRecord> = state
        .ncdb
        .search_as(T_USERS, &serde_json::json!({ "email": email }))
        .await?;

    let Some(user) = users.into_iter().next() else {
        tracing::info!("Login rejected: no account for {}", email);
        return Ok(auth_failed());
    };
    if !user.is_active {
        tracing::info!("Login rejected: account {} is inactive", email);
        return Ok(auth_failed());
    }
    let Some(hash) = user.password_hash.as_deref() else {
        tracing::error!("User record {} has no password hash", user.id);
        return Ok(auth_failed());
    };

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Unparseable password hash for user {}: {}", user.id, e);
            return Ok(auth_failed());
        }
    };
    if Argon2::default()
        .verify_password(request.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        tracing::info!("Login rejected: bad password for {}", email);
        return Ok(auth_failed());
    }

    let now = chrono::Utc::now().timestamp();
    let claims = SessionClaims {
        sub: user.id.to_string(),
        email: user.email.trim().to_ascii_lowercase(),
        role: user.role.clone(),
        capabilities: user.capabilities.clone(),
        assigned_restaurants: user.assigned_restaurants.clone(),
        ncdb_user_id: Some(user.id as i64),
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now,
        exp: now + state.auth.session_ttl_seconds,
    };
    let token = session::sign_token(&state.auth, &claims)?;
    let actor = Actor::from_session(&RawSession::from(&claims));

    tracing::info!("Login successful for {}", email);

    let response = responses::success(
        StatusCode::OK,
        &serde_json::json!({
            "token": token,
            "expires_in": state.auth.session_ttl_seconds,
            "actor": actor,
        }),
    );
    Ok(responses::with_cookie(
        response,
        session::session_cookie(&state.auth, &token),
    ))
}

/// Clear the session cookie. Tokens are not tracked server side, so this
/// is purely a cookie operation.
pub fn logout(state: &AppState) -> Response<Body> {
    let response = responses::success(
        StatusCode::OK,
        &serde_json::json!({ "logged_out": true }),
    );
    responses::with_cookie(response, session::clear_session_cookie(&state.auth))
}

/// Echo the resolved actor for the current session.
pub fn me(actor: &Actor) -> Response<Body> {
    responses::success(StatusCode::OK, actor)
}

fn auth_failed() -> Response<Body> {
    let body = serde_json::json!({
        "status": "error",
        "code": "AuthenticationFailed",
        "message": "Incorrect email or password",
    });
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(body.to_string().into())
        .unwrap_or_else(|_| {
            let mut resp = Response::new(Body::Empty);
            *resp.status_mut() = StatusCode::UNAUTHORIZED;
            resp
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_rejects_malformed_body() {
        let err = serde_json::from_slice::<LoginRequest>(b"{\"email\": 1}").unwrap_err();
        let app_err = AppError::from_body_parse(err);
        assert_eq!(app_err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_failure_response_is_generic_401() {
        let resp = auth_failed();
        assert_eq!(resp.status(), 401);
        let parsed: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(parsed["message"], "Incorrect email or password");
    }
}
