use allerq_shared::access::{Actor, RawSession};
use allerq_shared::error::AppError;
use allerq_shared::{auth, menu_items, menus, responses, restaurants, session, uploads, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, Response,
};
use std::sync::Arc;

/// Route an API Gateway request to the matching handler.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    tracing::info!("{} {}", method, path);

    if method == Method::OPTIONS {
        return Ok(responses::preflight());
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Auth endpoints that work without a session.
    match (&method, segments.as_slice()) {
        (&Method::POST, ["auth", "login"]) => {
            return Ok(auth::login(&state, event.body())
                .await
                .unwrap_or_else(|e| responses::error(&e)));
        }
        (&Method::POST, ["auth", "logout"]) => return Ok(auth::logout(&state)),
        _ => {}
    }

    // Everything else requires a verified session.
    let resolved = match session::resolve_session(&state.auth, event.headers()) {
        Ok(resolved) => resolved,
        Err(denied) => {
            tracing::info!("Session denied for {} {}: {}", method, path, denied.error);
            let mut resp = responses::error_with_status(&denied.error, denied.status());
            if denied.clear_cookie {
                resp = responses::with_cookie(
                    resp,
                    session::clear_session_cookie(&state.auth),
                );
            }
            return Ok(resp);
        }
    };
    let actor = Actor::from_session(&RawSession::from(&resolved.claims));

    let body = event.body();
    let result = match (&method, segments.as_slice()) {
        (&Method::GET, ["auth", "me"]) => Ok(auth::me(&actor)),

        (&Method::GET, ["restaurants"]) => restaurants::list_restaurants(&state, &actor).await,
        (&Method::POST, ["restaurants"]) => {
            restaurants::create_restaurant(&state, &actor, body).await
        }
        (&Method::GET, ["restaurants", id]) => {
            restaurants::get_restaurant(&state, &actor, id).await
        }
        (&Method::PATCH, ["restaurants", id]) => {
            restaurants::update_restaurant(&state, &actor, id, body).await
        }
        (&Method::DELETE, ["restaurants", id]) => {
            restaurants::delete_restaurant(&state, &actor, id).await
        }

        (&Method::GET, ["restaurants", id, "menus"]) => {
            menus::list_menus(&state, &actor, id).await
        }
        (&Method::POST, ["restaurants", id, "menus"]) => {
            menus::create_menu(&state, &actor, id, body).await
        }
        (&Method::GET, ["menus", id]) => menus::get_menu(&state, &actor, id).await,
        (&Method::PATCH, ["menus", id]) => menus::update_menu(&state, &actor, id, body).await,
        (&Method::DELETE, ["menus", id]) => menus::delete_menu(&state, &actor, id).await,

        (&Method::GET, ["menus", id, "items"]) => {
            menu_items::list_items(&state, &actor, id).await
        }
        (&Method::POST, ["menus", id, "items"]) => {
            menu_items::create_item(&state, &actor, id, body).await
        }
        (&Method::PATCH, ["items", id]) => menu_items::update_item(&state, &actor, id, body).await,
        (&Method::DELETE, ["items", id]) => menu_items::delete_item(&state, &actor, id).await,

        (&Method::POST, ["restaurants", id, "uploads"]) => {
            uploads::create_upload(&state, &actor, id, body).await
        }
        (&Method::GET, ["uploads", id]) => uploads::get_upload(&state, &actor, id).await,
        (&Method::POST, ["uploads", id, "promote"]) => {
            uploads::promote_upload(&state, &actor, id).await
        }
        (&Method::POST, ["uploads", id, "discard"]) => {
            uploads::discard_upload(&state, &actor, id).await
        }

        _ => Err(AppError::ResourceNotFound("Route")),
    };

    Ok(result.unwrap_or_else(|e| {
        if e.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{} {} failed: {:?}", method, path, e);
        }
        responses::error(&e)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use allerq_shared::ncdb::{NcdbClient, NcdbConfig};
    use allerq_shared::session::{sign_token, AuthConfig, SessionClaims};

    fn test_state() -> Arc<AppState> {
        let ncdb = NcdbClient::new(NcdbConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            instance: "test".to_string(),
            secret_key: "test".to_string(),
        });
        let auth = AuthConfig::new("test-secret".to_string(), "allerq_session".to_string(), 3600);
        AppState::new(ncdb, auth, None)
    }

    fn signed_token(state: &AppState) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: "7".to_string(),
            email: "owner@example.com".to_string(),
            role: Some("manager".to_string()),
            capabilities: None,
            assigned_restaurants: Some(vec![serde_json::json!("55")]),
            ncdb_user_id: Some(7),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + 3600,
        };
        sign_token(&state.auth, &claims).unwrap()
    }

    fn request(method: Method, path: &str) -> Request {
        lambda_http::http::Request::builder()
            .method(method)
            .uri(path)
            .body(Body::Empty)
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_is_open() {
        let resp = function_handler(request(Method::OPTIONS, "/restaurants"), test_state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .contains_key("Access-Control-Allow-Methods"));
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let resp = function_handler(request(Method::GET, "/restaurants"), test_state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let parsed: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["code"], "AuthenticationRequired");
    }

    #[tokio::test]
    async fn me_echoes_the_bearer_session() {
        let state = test_state();
        let token = signed_token(&state);
        let req = lambda_http::http::Request::builder()
            .method(Method::GET)
            .uri("/auth/me")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::Empty)
            .unwrap();

        let resp = function_handler(req, state).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(parsed["status"], "success");
        assert_eq!(parsed["data"]["email"], "owner@example.com");
        assert_eq!(parsed["data"]["role"], "manager");
    }

    #[tokio::test]
    async fn unknown_routes_are_404_after_auth() {
        let state = test_state();
        let token = signed_token(&state);
        let req = lambda_http::http::Request::builder()
            .method(Method::GET)
            .uri("/nope")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::Empty)
            .unwrap();

        let resp = function_handler(req, state).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let resp = function_handler(request(Method::POST, "/auth/logout"), test_state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers().get("Set-Cookie").unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn expired_cookie_is_cleared_on_the_response() {
        let state = test_state();
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: "7".to_string(),
            email: "owner@example.com".to_string(),
            role: None,
            capabilities: None,
            assigned_restaurants: None,
            ncdb_user_id: None,
            jti: "t-1".to_string(),
            iat: now - 100,
            exp: now - 10,
        };
        let token = sign_token(&state.auth, &claims).unwrap();
        let req = lambda_http::http::Request::builder()
            .method(Method::GET)
            .uri("/auth/me")
            .header("Cookie", format!("allerq_session={}", token))
            .body(Body::Empty)
            .unwrap();

        let resp = function_handler(req, state).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let cookie = resp.headers().get("Set-Cookie").unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
