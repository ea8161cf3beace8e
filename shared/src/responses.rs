use lambda_http::{http::StatusCode, Body, Response};
use serde::Serialize;

use crate::error::AppError;

/// Build a success envelope: `{"status":"success","data":...}`.
pub fn success<T: Serialize>(status: StatusCode, data: &T) -> Response<Body> {
    let body = serde_json::json!({
        "status": "success",
        "data": data,
    });
    json(status, &body)
}

/// Build an error envelope: `{"status":"error","code":...,"message":...}`.
pub fn error(err: &AppError) -> Response<Body> {
    error_with_status(err, err.status())
}

/// Error envelope with an explicit status override (session resolver
/// failures may carry their own status).
pub fn error_with_status(err: &AppError, status: StatusCode) -> Response<Body> {
    let body = serde_json::json!({
        "status": "error",
        "code": err.code(),
        "message": err.public_message(),
    });
    json(status, &body)
}

fn json(status: StatusCode, body: &serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Credentials", "true")
        .body(body.to_string().into())
        // Static headers and a serialized body cannot produce an invalid
        // response; fall back to a bare 500 if they somehow do.
        .unwrap_or_else(|_| {
            let mut resp = Response::new(Body::from(
                r#"{"status":"error","code":"InternalUnexpected","message":"Unexpected internal error"}"#,
            ));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        })
}

/// CORS preflight response.
pub fn preflight() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET,POST,PUT,PATCH,DELETE,OPTIONS",
        )
        .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
        .header("Access-Control-Allow-Credentials", "true")
        .body(Body::Empty)
        .unwrap_or_else(|_| Response::new(Body::Empty))
}

/// Append a Set-Cookie header to an already-built response.
pub fn with_cookie(mut response: Response<Body>, cookie: String) -> Response<Body> {
    if let Ok(value) = cookie.parse() {
        response.headers_mut().append("Set-Cookie", value);
    }
    response
}
