use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use captains_db::{open_database, DbRuntimeSettings, MEMORY_PATH};
use captains_log::Journal;
use captains_server::{app, AppState};
use futures_util::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

fn setup_app() -> axum::Router {
    let pool = open_database(MEMORY_PATH, DbRuntimeSettings::default()).unwrap();
    app(AppState::new(Journal::new(pool)))
}

/// Reads body chunks until one complete SSE event (terminated by a blank
/// line) is buffered, then returns its `event` and `data` fields.
async fn next_event<S>(stream: &mut S, buffer: &mut String) -> (String, String)
where
    S: futures_util::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let raw: String = buffer.drain(..end + 2).collect();
            let mut event = String::new();
            let mut data = String::new();
            for line in raw.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim());
                }
            }
            if event.is_empty() && data.is_empty() {
                // keep-alive comment
                continue;
            }
            return (event, data);
        }

        let chunk = stream
            .next()
            .await
            .expect("stream ended early")
            .expect("body chunk");
        buffer.push_str(std::str::from_utf8(&chunk).expect("utf-8 event"));
    }
}

#[tokio::test]
async fn sse_session_round_trip() {
    let app = setup_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut stream = response.into_body().into_data_stream();
    let mut buffer = String::new();

    let (event, endpoint) = next_event(&mut stream, &mut buffer).await;
    assert_eq!(event, "endpoint");
    assert!(endpoint.starts_with("/messages?session_id="));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&endpoint)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","id":41,"method":"tools/call","params":{"name":"add","arguments":{"a":40,"b":2}}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let (event, data) = next_event(&mut stream, &mut buffer).await;
    assert_eq!(event, "message");
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], 41);
    assert_eq!(message["result"]["content"][0]["text"], "42.0");
}

#[tokio::test]
async fn posting_to_unknown_session_is_not_found() {
    let app = setup_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/messages?session_id=does-not-exist")
                .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notifications_over_sse_are_accepted_silently() {
    let app = setup_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut stream = response.into_body().into_data_stream();
    let mut buffer = String::new();
    let (_, endpoint) = next_event(&mut stream, &mut buffer).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&endpoint)
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&endpoint)
                .body(Body::from(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The ping answer is the first message; the notification produced none.
    let (event, data) = next_event(&mut stream, &mut buffer).await;
    assert_eq!(event, "message");
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], "p");
}
