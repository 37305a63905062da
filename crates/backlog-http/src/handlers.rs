//! Endpoint handlers

use crate::error::ApiError;
use crate::response::{IntoResponse, Json, Response};
use crate::sse::{Sse, SseEvent};
use crate::state::AppState;
use backlog_core::source::query_with_timeout;
use futures_util::StreamExt;
use serde::Serialize;

/// SSE event name carried by every snapshot push
pub const UPDATE_EVENT: &str = "backlog-update";

/// `GET {prefix}/all`: query the source now and return the live result
///
/// The stored snapshot is neither read nor updated.
pub async fn fetch_all(state: &AppState) -> Response {
    match query_with_timeout(state.source.as_ref(), state.query_timeout).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => {
            tracing::warn!(source = state.source.name(), error = %err, "Fetch-all query failed");
            ApiError::from(err)
                .masked(state.expose_errors)
                .into_response()
        }
    }
}

/// `GET {prefix}/stream`: register a subscriber and stream its snapshots
///
/// Nothing is sent until the next change is broadcast. Every stream reuses
/// the snapshot's shared JSON rendering. The subscriber is unregistered when
/// the response body is dropped, which hyper does as soon as the connection
/// goes away.
pub fn stream(state: &AppState) -> Response {
    let subscription = state.registry.register();
    tracing::info!(
        subscriber = %subscription.id(),
        subscribers = state.registry.len(),
        "Stream subscriber connected"
    );

    let events = subscription.map(|snapshot| {
        snapshot
            .shared_json()
            .map(|json| SseEvent::new(json.as_ref()).event(UPDATE_EVENT))
    });
    Sse::new(events).keep_alive(state.keep_alive).into_response()
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    subscribers: usize,
    rows: usize,
}

/// `GET /health`
pub fn health(state: &AppState) -> Response {
    Json(Health {
        status: "ok",
        subscribers: state.registry.len(),
        rows: state.store.current().len(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlog_core::{MemorySource, Row, Snapshot, SnapshotStore, SubscriberRegistry};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use std::sync::Arc;

    fn live() -> Snapshot {
        Snapshot::from(vec![Row::new().with("idBackLog", 7).with("status", "new")])
    }

    fn state(source: Arc<MemorySource>) -> AppState {
        AppState::new(source, SubscriberRegistry::new(), Arc::new(SnapshotStore::new()))
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_fetch_all_returns_live_rows() {
        let source = Arc::new(MemorySource::new(live()));
        let response = fetch_all(&state(source.clone())).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            &body_bytes(response).await[..],
            br#"[{"idBackLog":7,"status":"new"}]"#
        );
        assert_eq!(source.query_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_unavailable_masks_detail() {
        let source = Arc::new(MemorySource::new(live()));
        source.fail_next(2);

        let hidden = fetch_all(&state(source.clone())).await;
        assert_eq!(hidden.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(hidden).await).unwrap();
        assert_eq!(json["error"]["type"], "service_unavailable");
        assert!(json["error"].get("detail").is_none());

        let shown = fetch_all(&state(source).expose_errors(true)).await;
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(shown).await).unwrap();
        assert!(json["error"]["detail"].is_string());
    }

    #[tokio::test]
    async fn test_stream_registers_and_unregisters() {
        let state = state(Arc::new(MemorySource::new(live())));

        let response = stream(&state);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.registry().len(), 1);

        drop(response);
        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_stream_emits_update_event() {
        let state = state(Arc::new(MemorySource::new(live()))).keep_alive(None);
        let mut body = stream(&state).into_body();

        let subscriber = state.registry().snapshot()[0].clone();
        subscriber.try_deliver(&Arc::new(live())).unwrap();

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(
            frame.into_data().unwrap(),
            "event: backlog-update\ndata: [{\"idBackLog\":7,\"status\":\"new\"}]\n\n"
        );
    }

    #[tokio::test]
    async fn test_streams_share_one_encoding_per_round() {
        let state = state(Arc::new(MemorySource::new(live()))).keep_alive(None);
        let mut first = stream(&state).into_body();
        let mut second = stream(&state).into_body();

        let round = Arc::new(live());
        for subscriber in state.registry().snapshot().iter() {
            subscriber.try_deliver(&round).unwrap();
        }

        let a = first.frame().await.unwrap().unwrap().into_data().unwrap();
        let b = second.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(a, b);

        // Both frames came from the rendering cached on the round's snapshot
        let cached = round.shared_json().unwrap();
        assert!(Arc::ptr_eq(&cached, &round.shared_json().unwrap()));
        assert_eq!(a, format!("event: {}\ndata: {}\n\n", UPDATE_EVENT, cached));
    }

    #[tokio::test]
    async fn test_stream_ends_after_eviction() {
        let state = state(Arc::new(MemorySource::new(live()))).keep_alive(None);
        let mut body = stream(&state).into_body();

        let id = state.registry().snapshot()[0].id();
        state.registry().unregister(id);

        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let state = state(Arc::new(MemorySource::new(live())));
        state.store().replace_if_changed(live());
        let _sub = state.registry().register();

        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes(health(&state)).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["subscribers"], 1);
        assert_eq!(json["rows"], 1);
    }
}
