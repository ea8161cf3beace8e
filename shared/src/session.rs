use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use lambda_http::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::access::RawSession;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Session configuration, constructed explicitly at process start and
/// carried in `AppState`. No module-level cached secret.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_secret: String,
    pub cookie_name: String,
    pub session_ttl_seconds: i64,
}

impl AuthConfig {
    pub fn new(session_secret: String, cookie_name: String, session_ttl_seconds: i64) -> Self {
        Self {
            session_secret,
            cookie_name,
            session_ttl_seconds,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Verified identity claims carried by the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_restaurants: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncdb_user_id: Option<i64>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl From<&SessionClaims> for RawSession {
    fn from(claims: &SessionClaims) -> Self {
        RawSession {
            id: Some(serde_json::Value::String(claims.sub.clone())),
            email: Some(claims.email.clone()),
            role: claims.role.clone(),
            capabilities: claims.capabilities.clone(),
            assigned_restaurants: claims.assigned_restaurants.clone(),
            ncdb_user_id: claims.ncdb_user_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Bearer,
}

#[derive(Debug)]
pub struct ResolvedSession {
    pub claims: SessionClaims,
    pub source: TokenSource,
}

/// Deny outcome of session resolution. `status` overrides the error's
/// default 401 when set; `clear_cookie` marks cookie-based flows whose
/// stale cookie should be cleared on the response.
#[derive(Debug)]
pub struct SessionDenied {
    pub error: AppError,
    pub status: Option<StatusCode>,
    pub clear_cookie: bool,
}

impl SessionDenied {
    fn new(error: AppError, clear_cookie: bool) -> Self {
        Self {
            error,
            status: None,
            clear_cookie,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.error.status())
    }
}

/// Resolve an inbound request's credentials to verified claims.
/// Cookie first, then a bearer token from the Authorization header.
/// Pure over the request headers.
pub fn resolve_session(
    config: &AuthConfig,
    headers: &HeaderMap,
) -> Result<ResolvedSession, SessionDenied> {
    if let Some(token) = cookie_value(headers, &config.cookie_name) {
        return match verify_token(config, &token) {
            Ok(claims) => Ok(ResolvedSession {
                claims,
                source: TokenSource::Cookie,
            }),
            Err(err) => Err(SessionDenied::new(err, true)),
        };
    }

    if let Some(token) = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    {
        return match verify_token(config, token) {
            Ok(claims) => Ok(ResolvedSession {
                claims,
                source: TokenSource::Bearer,
            }),
            Err(err) => Err(SessionDenied::new(err, false)),
        };
    }

    Err(SessionDenied::new(AppError::AuthenticationRequired, false))
}

/// Extract the token from an Authorization header value: optional leading
/// whitespace, case-insensitive `Bearer` scheme, then the token.
pub fn bearer_token(value: &str) -> Option<&str> {
    let value = value.trim_start();
    let (scheme, rest) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Sign claims into a compact HS256 token: three dot-separated base64url
/// segments (header, claims, signature).
pub fn sign_token(config: &AuthConfig, claims: &SessionClaims) -> Result<String, AppError> {
    let header = TokenHeader {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| AppError::Internal(e.to_string()))?,
    );
    let claims_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(claims).map_err(|e| AppError::Internal(e.to_string()))?,
    );

    let mut mac = HmacSha256::new_from_slice(config.session_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}.{}", header_b64, claims_b64, signature_b64))
}

/// Verify a compact token: format, algorithm, signature, then expiry.
pub fn verify_token(config: &AuthConfig, token: &str) -> Result<SessionClaims, AppError> {
    let mut parts = token.trim().split('.');
    let (header_b64, claims_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s), None) => (h, c, s),
            _ => return Err(AppError::TokenInvalid),
        };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| AppError::TokenInvalid)?;
    let header: TokenHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| AppError::TokenInvalid)?;
    if header.alg != "HS256" {
        return Err(AppError::TokenInvalid);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::TokenInvalid)?;
    let mut mac = HmacSha256::new_from_slice(config.session_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AppError::TokenInvalid)?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| AppError::TokenInvalid)?;
    let claims: SessionClaims =
        serde_json::from_slice(&claims_bytes).map_err(|_| AppError::TokenInvalid)?;

    if claims.exp <= chrono::Utc::now().timestamp() {
        return Err(AppError::TokenExpired);
    }

    Ok(claims)
}

/// Set-Cookie value carrying the session token.
pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        config.cookie_name, token, config.session_ttl_seconds
    )
}

/// Set-Cookie value that clears the session cookie.
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
        config.cookie_name
    )
}

/// Read a named cookie out of the request's Cookie header(s).
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all("Cookie") {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.split_once('=') {
                if key.trim() == name && !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
    }
    None
}
