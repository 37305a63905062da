//! Server-Sent Events
//!
//! [`SseEvent`] formats a single event. [`Sse`] turns a stream of events into
//! a streaming `text/event-stream` response that stays open until the stream
//! ends or the client goes away.
//!
//! # Example
//!
//! ```rust,ignore
//! use backlog_http::sse::{Sse, SseEvent};
//! use futures_util::StreamExt;
//!
//! let events = subscription.map(|snapshot| SseEvent::json(&*snapshot));
//! let response = Sse::new(events)
//!     .keep_alive(Some(Duration::from_secs(15)))
//!     .into_response();
//! ```

use crate::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use http::{header, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use hyper::body::{Body, Frame};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const KEEP_ALIVE_COMMENT: &[u8] = b": keep-alive\n\n";

/// A Server-Sent Event
///
/// Each event can have:
/// - `data`: The event data (required)
/// - `event`: The event type/name (optional)
/// - `id`: The event ID for reconnection (optional)
/// - `retry`: Reconnection time in milliseconds (optional)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Create a new SSE event with the given data
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Create an event whose data is `value` rendered as JSON
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_string(value).map(Self::new)
    }

    /// Set the event type/name
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the event ID
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the retry time in milliseconds
    pub fn retry(mut self, retry: u64) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Format the event as an SSE message
    ///
    /// Multi-line data is split into one `data:` line per line, and the event
    /// is terminated with a blank line.
    pub fn to_sse_string(&self) -> String {
        let mut output = String::with_capacity(self.data.len() + 32);

        if let Some(ref event) = self.event {
            let _ = writeln!(output, "event: {}", event);
        }
        if let Some(ref id) = self.id {
            let _ = writeln!(output, "id: {}", id);
        }
        if let Some(retry) = self.retry {
            let _ = writeln!(output, "retry: {}", retry);
        }
        if self.data.is_empty() {
            output.push_str("data: \n");
        }
        for line in self.data.lines() {
            let _ = writeln!(output, "data: {}", line);
        }

        output.push('\n');
        output
    }
}

/// Server-Sent Events response builder
pub struct Sse<S> {
    stream: S,
    keep_alive: Option<Duration>,
}

impl<S> Sse<S> {
    /// Create a new SSE response from a stream of events
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            keep_alive: None,
        }
    }

    /// Send a `: keep-alive` comment whenever the stream has been quiet for
    /// `interval`
    ///
    /// Besides keeping proxies from timing the connection out, the periodic
    /// write is what detects a client that vanished without closing.
    pub fn keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval.filter(|d| !d.is_zero());
        self
    }
}

impl<S, E> IntoResponse for Sse<S>
where
    S: Stream<Item = Result<SseEvent, E>> + Send + Unpin + 'static,
    E: fmt::Display,
{
    fn into_response(self) -> Response {
        let keep_alive = self.keep_alive.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let body = SseBody {
            stream: self.stream,
            keep_alive,
        };

        let mut response = Response::new(body.boxed_unsync());
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        response
    }
}

/// Streaming body behind an [`Sse`] response
struct SseBody<S> {
    stream: S,
    keep_alive: Option<Interval>,
}

impl<S, E> Body for SseBody<S>
where
    S: Stream<Item = Result<SseEvent, E>> + Unpin,
    E: fmt::Display,
{
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();

        match Pin::new(&mut this.stream).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                if let Some(keep_alive) = this.keep_alive.as_mut() {
                    keep_alive.reset();
                }
                let bytes = Bytes::from(event.to_sse_string());
                return Poll::Ready(Some(Ok(Frame::data(bytes))));
            }
            Poll::Ready(Some(Err(err))) => {
                tracing::error!(error = %err, "Failed to encode event, closing stream");
                return Poll::Ready(None);
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        if let Some(keep_alive) = this.keep_alive.as_mut() {
            if keep_alive.poll_tick(cx).is_ready() {
                return Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(KEEP_ALIVE_COMMENT)))));
            }
        }

        Poll::Pending
    }
}
