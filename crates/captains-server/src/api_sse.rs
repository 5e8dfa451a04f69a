//! SSE transport handlers.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming the
//! URL to post its messages to. Each message it posts there is handled and
//! the response is pushed back down the same stream as a `message` event.

use crate::api::ApiError;
use crate::protocol::JsonRpcResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures_util::Stream;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Responses buffered per session before posting blocks.
const SESSION_BUFFER: usize = 64;

/// Open SSE sessions, keyed by session id.
///
/// Uses `std::sync::RwLock`: every acquisition is a short map operation
/// that never spans an `.await`.
#[derive(Clone, Debug, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, mpsc::Sender<JsonRpcResponse>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its id and response receiver.
    pub fn open(&self) -> (String, mpsc::Receiver<JsonRpcResponse>) {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.write().insert(session_id.clone(), tx);
        tracing::info!(session_id = %session_id, "sse session opened");
        (session_id, rx)
    }

    /// Sender for `session_id`, if the session is still open.
    pub fn sender(&self, session_id: &str) -> Option<mpsc::Sender<JsonRpcResponse>> {
        self.read().get(session_id).cloned()
    }

    pub fn close(&self, session_id: &str) {
        if self.write().remove(session_id).is_some() {
            tracing::info!(session_id, "sse session closed");
        }
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, mpsc::Sender<JsonRpcResponse>>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            tracing::error!("sse session table poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, mpsc::Sender<JsonRpcResponse>>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            tracing::error!("sse session table poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Removes its session from the table when the stream is dropped, which
/// happens when the client disconnects.
struct SessionGuard {
    session_id: String,
    sessions: SessionManager,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.close(&self.session_id);
    }
}

/// Query string for `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub session_id: String,
}

/// Handler for `GET /sse`.
pub async fn sse_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session_id, rx) = state.sessions.open();

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={session_id}"));

    let guard = SessionGuard {
        session_id,
        sessions: state.sessions.clone(),
    };

    let messages = ReceiverStream::new(rx).filter_map(move |response| {
        let _held = &guard;
        match serde_json::to_string(&response) {
            Ok(data) => Some(Ok(Event::default().event("message").data(data))),
            Err(e) => {
                tracing::error!("failed to serialize sse response: {}", e);
                None
            }
        }
    });

    let stream = tokio_stream::once(Ok(endpoint)).chain(messages);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Handler for `POST /messages?session_id=<id>`.
///
/// Accepts one JSON-RPC message for an open session; the response, if any,
/// is delivered on that session's stream.
pub async fn messages_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let sender = state
        .sessions
        .sender(&query.session_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session: {}", query.session_id)))?;

    if let Some(response) = state.mcp.handle_message(&body).await {
        sender.send(response).await.map_err(|_| {
            state.sessions.close(&query.session_id);
            ApiError::NotFound(format!("session closed: {}", query.session_id))
        })?;
    }

    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sessions_open_deliver_and_close() {
        let sessions = SessionManager::new();
        let (id, mut rx) = sessions.open();
        assert_eq!(sessions.len(), 1);

        let sender = sessions.sender(&id).expect("session should be open");
        sender
            .send(JsonRpcResponse::success(Some(json!(1)), json!({})))
            .await
            .expect("send");
        let received = rx.recv().await.expect("response");
        assert_eq!(received.id, Some(json!(1)));

        sessions.close(&id);
        assert!(sessions.sender(&id).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn dropping_guard_closes_session() {
        let sessions = SessionManager::new();
        let (session_id, _rx) = sessions.open();
        drop(SessionGuard {
            session_id: session_id.clone(),
            sessions: sessions.clone(),
        });
        assert!(sessions.sender(&session_id).is_none());
    }
}
