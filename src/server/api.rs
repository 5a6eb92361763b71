use crate::error::RelayError;
use crate::models::relay::RelayRequest;
use crate::relay::RelayService;
use std::convert::Infallible;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ State, rejection::JsonRejection },
    response::{ IntoResponse, Response, sse::{ Event, Sse } },
    http::{ HeaderName, HeaderValue },
};
use futures::StreamExt;
use serde_json::{ json, Value };
use tower_http::cors::{ Any, CorsLayer };
use log::info;

pub const RELAY_PATH: &str = "/relay";

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayService,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(RELAY_PATH, post(relay_handler).fallback(method_not_allowed))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "astra-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn method_not_allowed() -> RelayError {
    RelayError::MethodNotAllowed
}

async fn relay_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, RelayError> {
    let Json(body) = payload.map_err(|e| RelayError::InvalidRequest(e.body_text()))?;
    let request = RelayRequest::from_value(body)?;
    info!("Relay request received: {} turns, stream={}", request.turns.len(), request.stream);

    let api_key = state.relay.credential()?;

    if request.stream {
        let frames = state.relay
            .stream(api_key, request.turns)
            .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.data())));
        let headers = [(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"))];
        return Ok((headers, Sse::new(frames)).into_response());
    }

    let response = state.relay.complete(&api_key, &request.turns).await?;
    Ok(Json(response).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeySource;
    use crate::error::{ MISSING_KEY_MESSAGE, STREAM_FAILURE_MESSAGE, UPSTREAM_FAILURE_MESSAGE };
    use crate::llm::chat::mock::{ ScriptedClient, Step };
    use crate::models::relay::RelayFrame;
    use crate::sse::data_payload;
    use axum::body::{ to_bytes, Body };
    use axum::http::{ header, Request, StatusCode };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(client: Arc<ScriptedClient>, key: Option<&str>) -> Router {
        let relay = RelayService::new(client, ApiKeySource::Fixed(key.map(str::to_string)));
        create_router(AppState { relay })
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::post(RELAY_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Option<String>, String) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    fn frames(body: &str) -> Vec<RelayFrame> {
        body.lines()
            .filter_map(data_payload)
            .map(|data| RelayFrame::decode(data).unwrap().unwrap())
            .collect()
    }

    fn hello_script() -> Vec<Step> {
        vec![Step::Delta("Hello"), Step::Delta(", "), Step::Delta("world"), Step::Done]
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected_without_upstream_call() {
        let bodies = [
            json!({}),
            json!({ "messages": [] }),
            json!({ "messages": "hi" }),
            json!({ "messages": [], "stream": true }),
        ];
        for body in bodies {
            let client = Arc::new(ScriptedClient::new(hello_script()));
            let (status, _, text) = send(router(client.clone(), Some("sk")), post_json(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let err: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(err["error"], json!("Messages array is required"));
            assert_eq!(client.calls(), 0);
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_a_bad_request() {
        let client = Arc::new(ScriptedClient::new(hello_script()));
        let req = Request::post(RELAY_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, text) = send(router(client.clone(), Some("sk")), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(serde_json::from_str::<Value>(&text).unwrap()["error"].is_string());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn missing_credential_fails_closed_without_upstream_call() {
        for stream in [false, true] {
            let client = Arc::new(ScriptedClient::new(hello_script()));
            let body = json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": stream });
            let (status, _, text) = send(router(client.clone(), None), post_json(body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({ "error": MISSING_KEY_MESSAGE }));
            assert_eq!(client.calls(), 0);
        }
    }

    #[tokio::test]
    async fn non_streaming_returns_message_and_usage() {
        let client = Arc::new(ScriptedClient::new(hello_script()));
        let body = json!({ "messages": [{ "role": "user", "content": "hi" }] });
        let (status, _, text) = send(router(client.clone(), Some("sk")), post_json(body)).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["message"], json!({ "role": "assistant", "content": "Hello, world" }));
        assert_eq!(value["usage"]["total_tokens"], json!(8));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn non_streaming_upstream_failure_is_a_generic_500() {
        let client = Arc::new(ScriptedClient::failing_completion("status 429: slow down"));
        let body = json!({ "messages": [{ "role": "user", "content": "hi" }] });
        let (status, _, text) = send(router(client, Some("sk")), post_json(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "error": UPSTREAM_FAILURE_MESSAGE }));
        assert!(value.get("message").is_none());
    }

    #[tokio::test]
    async fn streaming_relays_deltas_and_one_sentinel() {
        let client = Arc::new(ScriptedClient::new(hello_script()));
        let body = json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": true });
        let (status, content_type, text) = send(router(client, Some("sk")), post_json(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/event-stream"));
        assert!(text.contains("data: [DONE]\n\n"));

        let frames = frames(&text);
        assert_eq!(frames.iter().filter(|f| **f == RelayFrame::Done).count(), 1);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
    }

    #[tokio::test]
    async fn streamed_deltas_concatenate_to_the_non_streaming_answer() {
        let script = || {
            vec![
                Step::Delta("The "),
                Step::Empty,
                Step::Delta("quick "),
                Step::Delta("brown fox"),
                Step::Done
            ]
        };
        let turns = json!([{ "role": "user", "content": "say it" }]);

        let (_, _, whole) = send(
            router(Arc::new(ScriptedClient::new(script())), Some("sk")),
            post_json(json!({ "messages": turns.clone() }))
        ).await;
        let whole: Value = serde_json::from_str(&whole).unwrap();

        let (_, _, streamed) = send(
            router(Arc::new(ScriptedClient::new(script())), Some("sk")),
            post_json(json!({ "messages": turns, "stream": true }))
        ).await;
        let joined: String = frames(&streamed)
            .into_iter()
            .filter_map(|f| match f {
                RelayFrame::Delta(d) => Some(d),
                _ => None,
            })
            .collect();

        assert_eq!(whole["message"]["content"], json!(joined));
    }

    #[tokio::test]
    async fn mid_stream_failure_becomes_one_error_frame() {
        let client = Arc::new(
            ScriptedClient::new(vec![Step::Delta("a"), Step::Delta("b"), Step::Fail("reset by peer")])
        );
        let body = json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": true });
        let (status, _, text) = send(router(client, Some("sk")), post_json(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(frames(&text), vec![
            RelayFrame::Delta("a".into()),
            RelayFrame::Delta("b".into()),
            RelayFrame::Error(STREAM_FAILURE_MESSAGE.into())
        ]);
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let client = Arc::new(ScriptedClient::new(hello_script()));
        let req = Request::get(RELAY_PATH).body(Body::empty()).unwrap();
        let (status, _, text) = send(router(client.clone(), Some("sk")), req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({ "error": "Method not allowed" }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, _, text) = send(router(client, None), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["status"], json!("ok"));
    }
}
