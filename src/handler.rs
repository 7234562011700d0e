use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::secret::SecretToken;
use crate::update::Update;

/// Header the Bot API uses to echo the registered secret token.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

const BODY_LIMIT: usize = 1024 * 1024;

/// Read-only state shared by every request.
pub struct AppState {
    pub api: ApiClient,
    pub secret: SecretToken,
}

impl AppState {
    pub fn new(api: ApiClient, secret: SecretToken) -> Self {
        Self { api, secret }
    }
}

/// Build the webhook router. Every path and method lands on the same handler.
pub fn router(state: Arc<AppState>, dump: bool) -> Router {
    let router = Router::new().fallback(handle_update).with_state(state);
    if dump {
        router.layer(middleware::from_fn(dump_exchange))
    } else {
        router
    }
}

async fn handle_update(State(state): State<Arc<AppState>>, request: Request) -> StatusCode {
    let (parts, body) = request.into_parts();

    let provided = parts
        .headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.secret.matches(provided) {
        debug!("Rejected webhook call to {}: bad secret token", parts.uri);
        return StatusCode::UNAUTHORIZED;
    }

    if parts.method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED;
    }

    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(b) => b,
        Err(e) => {
            warn!("failed to read request body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let update: Update = match serde_json::from_slice(&bytes) {
        Ok(u) => u,
        Err(e) => {
            warn!("failed to decode request body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let Some(message) = update.story_message() else {
        return StatusCode::OK;
    };

    info!(
        "Deleting story message {} in chat {}",
        message.id, message.chat.id
    );

    if let Err(e) = state.api.delete_message(message.chat.id, message.id).await {
        error!("failed to delete story: {:#}", e);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    StatusCode::OK
}

/// Logs each request and response in full. Installed only in debug mode.
async fn dump_exchange(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(b) => b,
        Err(e) => {
            warn!("debug dump could not buffer request body: {}", e);
            Default::default()
        }
    };

    info!(
        "--> {} {} headers={} body={}",
        parts.method,
        parts.uri,
        redacted_headers(&parts.headers),
        String::from_utf8_lossy(&bytes)
    );

    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;

    info!("<-- {}", response.status());

    response
}

fn redacted_headers(headers: &HeaderMap) -> String {
    let pairs: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            let value = if name.as_str() == SECRET_HEADER {
                "[REDACTED]".into()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            format!("{}: {}", name, value)
        })
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{any, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STORY: &str = include_str!("../testdata/story.json");
    const TEXT: &str = include_str!("../testdata/text.json");

    fn secret() -> SecretToken {
        SecretToken::generate_with(&mut StdRng::seed_from_u64(7))
    }

    fn app(server: &MockServer, dump: bool) -> Router {
        let api = ApiClient::new(format!("{}/botT/", server.uri())).unwrap();
        router(Arc::new(AppState::new(api, secret())), dump)
    }

    fn request(method: Method, token: Option<&str>, body: &str) -> Request {
        let mut builder = axum::http::Request::builder()
            .method(method)
            .uri("/webhook");
        if let Some(token) = token {
            builder = builder.header("X-Telegram-Bot-Api-Secret-Token", token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn expect_no_api_calls(server: &MockServer) {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }

    async fn send(app: Router, req: Request) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_bad_secret_is_401() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let good = secret();
        let swapped: String = good
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_uppercase() {
                    c.to_ascii_lowercase()
                } else {
                    c.to_ascii_uppercase()
                }
            })
            .collect();

        for token in [None, Some(""), Some("wrong"), Some(swapped.as_str())] {
            let (status, _) = send(app(&server, false), request(Method::POST, token, STORY)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "token {:?}", token);
        }
    }

    #[tokio::test]
    async fn test_non_utf8_secret_is_401() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header(SECRET_HEADER, HeaderValue::from_bytes(&[0xff]).unwrap())
            .body(Body::from(STORY))
            .unwrap();
        let (status, _) = send(app(&server, false), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_checked_before_method() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let (status, _) = send(app(&server, false), request(Method::GET, Some("nope"), "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_is_405() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let token = secret();
        for body in ["", STORY] {
            let (status, _) =
                send(app(&server, false), request(Method::GET, Some(token.as_str()), body)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let token = secret();
        for body in ["not json", "[]", r#"{"message": 5}"#, ""] {
            let (status, _) =
                send(app(&server, false), request(Method::POST, Some(token.as_str()), body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        }
    }

    #[tokio::test]
    async fn test_story_is_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT/deleteMessage"))
            .and(body_json(json!({"chat_id": -1001234567890i64, "message_id": 4821})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let token = secret();
        let (status, body) =
            send(app(&server, false), request(Method::POST, Some(token.as_str()), STORY)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_is_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT/deleteMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: message can't be deleted"))
            .expect(1)
            .mount(&server)
            .await;

        let token = secret();
        let (status, body) =
            send(app(&server, false), request(Method::POST, Some(token.as_str()), STORY)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_non_story_is_ignored() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let token = secret();
        for body in [TEXT, "{}", r#"{"update_id":1,"channel_post":{"message_id":1}}"#] {
            let (status, resp) =
                send(app(&server, false), request(Method::POST, Some(token.as_str()), body)).await;
            assert_eq!(status, StatusCode::OK, "body {:?}", body);
            assert!(resp.is_empty());
        }
    }

    #[tokio::test]
    async fn test_any_path_is_served() {
        let server = MockServer::start().await;
        expect_no_api_calls(&server).await;

        let token = secret();
        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/some/other/path?x=1")
            .header(SECRET_HEADER, token.as_str())
            .body(Body::from(TEXT))
            .unwrap();
        let (status, _) = send(app(&server, false), req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dump_does_not_change_behavior() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT/deleteMessage"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let token = secret();
        let (status, _) = send(app(&server, true), request(Method::POST, Some("bad"), STORY)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(app(&server, true), request(Method::GET, Some(token.as_str()), "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) =
            send(app(&server, true), request(Method::POST, Some(token.as_str()), STORY)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_redacted_headers_hide_secret() {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, "top-secret".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        let out = redacted_headers(&headers);
        assert!(!out.contains("top-secret"));
        assert!(out.contains("[REDACTED]"));
        assert!(out.contains("content-type: application/json"));
    }
}
