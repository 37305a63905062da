//! CORS (Cross-Origin Resource Sharing) handling.
//!
//! The feed is meant to be consumed from browser dashboards served from
//! anywhere, so the default is [`CorsLayer::permissive`]. An explicit origin
//! list can be configured instead.
//!
//! # Example
//!
//! ```ignore
//! use backlog_http::cors::CorsLayer;
//!
//! let cors = CorsLayer::permissive();
//! let cors = CorsLayer::new().allow_origins(["https://dashboard.example.com"]);
//! ```

use crate::response::{status, Response};
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use std::time::Duration;

/// Specifies which origins are allowed for CORS requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Allow any origin (`Access-Control-Allow-Origin: *`).
    Any,
    /// Allow only specific origins.
    List(Vec<String>),
}

impl Default for AllowedOrigins {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// CORS configuration applied to every response.
#[derive(Debug, Clone)]
pub struct CorsLayer {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    headers: Vec<String>,
    max_age: Option<Duration>,
}

impl Default for CorsLayer {
    fn default() -> Self {
        Self::permissive()
    }
}

impl CorsLayer {
    /// Create a CORS layer that allows no origins.
    pub fn new() -> Self {
        Self {
            origins: AllowedOrigins::default(),
            methods: vec![Method::GET, Method::OPTIONS],
            headers: Vec::new(),
            max_age: None,
        }
    }

    /// Allow any origin to read the feed.
    pub fn permissive() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            methods: vec![Method::GET, Method::OPTIONS],
            headers: vec!["*".to_string()],
            max_age: Some(Duration::from_secs(86400)),
        }
    }

    /// Allow any origin.
    pub fn allow_any_origin(mut self) -> Self {
        self.origins = AllowedOrigins::Any;
        self
    }

    /// Allow specific origins.
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = AllowedOrigins::List(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Allow specific request headers.
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the max age for preflight cache.
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    pub fn origins(&self) -> &AllowedOrigins {
        &self.origins
    }

    /// Whether a request is a CORS preflight.
    pub fn is_preflight(&self, method: &Method, headers: &HeaderMap) -> bool {
        method == Method::OPTIONS && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn is_origin_allowed(&self, origin: &HeaderValue) -> bool {
        match &self.origins {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(list) => origin
                .to_str()
                .map(|o| list.iter().any(|allowed| allowed == o))
                .unwrap_or(false),
        }
    }

    fn allow_origin_value(&self, origin: &HeaderValue) -> HeaderValue {
        match self.origins {
            AllowedOrigins::Any => HeaderValue::from_static("*"),
            AllowedOrigins::List(_) => origin.clone(),
        }
    }

    /// Answer a preflight request.
    pub fn preflight(&self, origin: Option<&HeaderValue>) -> Response {
        let mut response = status(StatusCode::NO_CONTENT);
        let headers = response.headers_mut();

        if let Some(origin) = origin.filter(|o| self.is_origin_allowed(o)) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin_value(origin));
        }

        let methods = self
            .methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&methods) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
        }

        let allowed_headers = if self.headers.is_empty() {
            "Content-Type".to_string()
        } else {
            self.headers.join(", ")
        };
        if let Ok(value) = HeaderValue::from_str(&allowed_headers) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }

        if let Some(max_age) = self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age.as_secs()));
        }

        response
    }

    /// Add CORS headers to a response for a request from `origin`.
    pub fn apply(&self, response: &mut Response, origin: Option<&HeaderValue>) {
        let Some(origin) = origin.filter(|o| self.is_origin_allowed(o)) else {
            return;
        };
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin_value(origin));
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Content-Length, Content-Type"),
        );
        if matches!(self.origins, AllowedOrigins::List(_)) {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
}
