use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::services::session_service::{SessionHandle, SESSION_COOKIE};
use crate::AppState;

/// Upper bound for request bodies, shared with the body limit layer.
pub const BODY_LIMIT: usize = 1024 * 1024;

const CART_AJAX_PATHS: [&str; 3] = ["/add-to-cart/", "/update-cart-item/", "/remove-from-cart/"];

pub fn is_cart_ajax(path: &str) -> bool {
    CART_AJAX_PATHS.contains(&path)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn init_data_from_authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("tma "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn init_data_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "tgWebAppData")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn init_data_from_json(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("_auth")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn init_data_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Telegram-Init-Data")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Finds init data in the request. A JSON body is buffered and put back.
async fn take_init_data(req: Request) -> (Request, Option<String>) {
    if let Some(data) =
        init_data_from_authorization(req.headers()).or_else(|| init_data_from_query(req.uri().query()))
    {
        return (req, Some(data));
    }

    let mut req = req;
    let mut from_body = None;
    if req.method() == Method::POST && is_json(req.headers()) {
        let (parts, body) = req.into_parts();
        let bytes = match to_bytes(body, BODY_LIMIT).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not buffer request body for auth: {}", e);
                Bytes::new()
            }
        };
        from_body = init_data_from_json(&bytes);
        req = Request::from_parts(parts, Body::from(bytes));
    }

    let data = from_body.or_else(|| init_data_from_header(req.headers()));
    (req, data)
}

fn session_cookie(state: &AppState, id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(state.sessions.ttl().num_seconds()))
        .build()
}

/// Loads the browser session, logs Telegram Web App users in, and saves the session afterwards.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let cookie = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let session = match state.sessions.load(cookie.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to load session: {:#}", e);
            SessionHandle::default()
        }
    };

    let mut req = req;
    if !session.is_authenticated().await && !is_cart_ajax(req.uri().path()) && state.config.bot_token.is_some() {
        let (rebuilt, init_data) = take_init_data(req).await;
        req = rebuilt;
        if let Some(init_data) = init_data {
            match state.auth_service.authenticate(&init_data, Utc::now()).await {
                Ok(user) => session.login(user.id).await,
                Err(e) => debug!("Telegram Web App auth failed: {}", e),
            }
        }
    }

    req.extensions_mut().insert(session.clone());
    let response = next.run(req).await;

    match state.sessions.persist(&session).await {
        Ok(Some(id)) => (jar.add(session_cookie(&state, id)), response).into_response(),
        Ok(None) => response,
        Err(e) => {
            error!("Failed to save session: {:#}", e);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn authorization_and_query_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("tma user=1&hash=ab"));
        assert_eq!(init_data_from_authorization(&headers).as_deref(), Some("user=1&hash=ab"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        assert_eq!(init_data_from_authorization(&headers), None);
        assert_eq!(extract_bearer_token(&headers), Some("secret"));

        let query = "foo=1&tgWebAppData=auth_date%3D1%26hash%3Dcd";
        assert_eq!(init_data_from_query(Some(query)).as_deref(), Some("auth_date=1&hash=cd"));
        assert_eq!(init_data_from_query(Some("foo=1")), None);
    }

    #[test]
    fn json_body_source() {
        assert_eq!(init_data_from_json(br#"{"_auth":"a=1&hash=x","item":3}"#).as_deref(), Some("a=1&hash=x"));
        assert_eq!(init_data_from_json(br#"{"_auth":""}"#), None);
        assert_eq!(init_data_from_json(b"not json"), None);
    }

    #[tokio::test]
    async fn json_body_survives_inspection() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/orders/create-payment/")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Telegram-Init-Data", "from_header")
            .body(Body::from(r#"{"_auth":"from_body"}"#))
            .unwrap();
        let (req, data) = take_init_data(req).await;
        assert_eq!(data.as_deref(), Some("from_body"));
        let body = to_bytes(req.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], br#"{"_auth":"from_body"}"#);
    }

    #[test]
    fn cart_ajax_paths_skip_auth() {
        assert!(is_cart_ajax("/add-to-cart/"));
        assert!(is_cart_ajax("/remove-from-cart/"));
        assert!(!is_cart_ajax("/cart/"));
    }
}
