//! HTTP server implementation

use crate::error::{ApiError, ServerError};
use crate::handlers;
use crate::response::{IntoResponse, Response};
use crate::router::{Route, RouteMatch, Routes};
use crate::state::AppState;
use http::{header, HeaderValue, Method, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Backlog feed server
///
/// Answers CORS preflights, dispatches the fixed route table and logs every
/// request.
#[derive(Clone)]
pub struct Server {
    state: Arc<AppState>,
    routes: Arc<Routes>,
}

impl Server {
    /// Mount the backlog routes under `prefix`
    pub fn new(state: AppState, prefix: &str) -> Result<Self, ServerError> {
        Ok(Self {
            state: Arc::new(state),
            routes: Arc::new(Routes::new(prefix)?),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Accept connections on `listener` until `shutdown` resolves
    ///
    /// Open connections, including event streams, are closed once the
    /// shutdown signal fires.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info!("Backlog feed listening on http://{}{}", addr, self.routes.prefix());

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(open_connections = connections.len(), "Shutting down server");
                    break;
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "Failed to accept connection");
                            continue;
                        }
                    };
                    connections.spawn(self.clone().serve_connection(stream, remote_addr));
                }
            }
        }

        connections.shutdown().await;
        Ok(())
    }

    async fn serve_connection(self, stream: tokio::net::TcpStream, remote_addr: SocketAddr) {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req: hyper::Request<Incoming>| {
            let server = self.clone();
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        });

        // Stream clients going away mid-write surface here; that is routine
        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            debug!(remote = %remote_addr, error = %err, "Connection closed with error");
        }
    }

    /// Handle a single HTTP request
    pub async fn handle<B>(&self, req: http::Request<B>) -> Response {
        let (parts, _) = req.into_parts();
        let method = parts.method;
        let path = parts.uri.path().to_string();
        let origin = parts.headers.get(header::ORIGIN).cloned();
        let start = Instant::now();
        let cors = &self.state.cors;

        let mut response = if cors.is_preflight(&method, &parts.headers) {
            cors.preflight(origin.as_ref())
        } else {
            match self.routes.match_route(&path) {
                RouteMatch::NotFound => {
                    ApiError::not_found(format!("No route found for {} {}", method, path))
                        .into_response()
                }
                RouteMatch::Found(_) if method != Method::GET => {
                    let mut response = ApiError::method_not_allowed(format!(
                        "Method {} not allowed for {}",
                        method, path
                    ))
                    .into_response();
                    response
                        .headers_mut()
                        .insert(header::ALLOW, HeaderValue::from_static("GET"));
                    response
                }
                RouteMatch::Found(Route::FetchAll) => handlers::fetch_all(&self.state).await,
                RouteMatch::Found(Route::Stream) => handlers::stream(&self.state),
                RouteMatch::Found(Route::Health) => handlers::health(&self.state),
            }
        };

        cors.apply(&mut response, origin.as_ref());
        log_request(&method, &path, response.status(), start);
        response
    }
}

/// Bind a listener, validating the address first
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|_| ServerError::InvalidAddress(addr.to_string()))?;
    Ok(TcpListener::bind(addr).await?)
}

/// Resolves on Ctrl-C, for use as the [`Server::serve`] shutdown future
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for Ctrl-C");
        // Without a signal handler, keep serving until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received");
}

/// Log request completion
fn log_request(method: &Method, path: &str, status: StatusCode, start: Instant) {
    let elapsed = start.elapsed();

    if status.is_success() {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    } else {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request failed"
        );
    }
}
