//! Minimal control-plane HTTP server.
//!
//! Requests are matched against an ordered table of regex [`Routes`]; the first
//! full match wins. Handlers return an [`HttpResponse`] or a [`HandlerError`]:
//! a [`RequestFailure`] keeps its status, anything else (including a panic)
//! becomes `500` with the detail logged, never sent.
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use switchboard::http::{route_fn, HttpResponse, HttpServer, Routes};
//!
//! # async fn demo() -> Result<(), switchboard::http::ServerError> {
//! let mut routes = Routes::new();
//! routes.add("/ping", route_fn(|_req, _caps| async {
//!     Ok(HttpResponse::text(StatusCode::OK, "pong\n"))
//! }))?;
//! let server = HttpServer::bind("127.0.0.1:0", routes).await?;
//! println!("listening on {}", server.local_addr());
//! server.close().await;
//! # Ok(()) }
//! ```

/// Request dispatch.
pub mod dispatch;
/// Responses and handler failures.
pub mod response;
/// Route table and handlers.
pub mod route;
/// Listener lifecycle.
pub mod server;

pub use dispatch::Dispatcher;
pub use response::{HandlerError, HttpRequest, HttpResponse, RequestFailure};
pub use route::{route_fn, Captures, RouteFn, RouteHandler, Routes};
pub use server::{HttpServer, DEFAULT_MAX_BODY_BYTES};

/// Listener and route-table errors.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// A route pattern failed to compile.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
    /// Socket error while binding or inspecting the listener.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}
