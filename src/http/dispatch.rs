use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};
use tower::Service;
use tracing::{debug, error};

use super::response::{HandlerError, HttpRequest, HttpResponse, RequestFailure};
use super::route::Routes;

/// Methods the dispatcher passes on to handlers.
pub const SUPPORTED_METHODS: &str = "GET, POST, DELETE";

/// Routes a decoded request to the first matching handler and turns every
/// outcome, including a panic, into a response.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    routes: Arc<Routes>,
}

impl Dispatcher {
    /// Dispatch over a fixed route table.
    pub fn new(routes: Routes) -> Self {
        Self { routes: Arc::new(routes) }
    }

    /// The route table being served.
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Handle one request. Never fails: errors become 4xx/5xx responses.
    pub async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        if !is_supported(&method) {
            return RequestFailure::method_not_allowed()
                .with_header(ALLOW, HeaderValue::from_static(SUPPORTED_METHODS))
                .into_response();
        }
        let Some((handler, captures)) = self.routes.find(&path) else {
            debug!(target: "switchboard::http", method = %method, path = %path, "no route");
            return RequestFailure::not_found().into_response();
        };

        let outcome = AssertUnwindSafe(handler.handle(request, captures)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(HandlerError::Request(failure))) => failure.into_response(),
            Ok(Err(HandlerError::Unexpected(e))) => {
                error!(target: "switchboard::http", method = %method, path = %path, error = %e, "handler failed");
                internal_error()
            }
            Err(panic) => {
                error!(target: "switchboard::http", method = %method, path = %path, panic = %panic_message(&*panic), "handler panicked");
                internal_error()
            }
        };
        debug!(target: "switchboard::http", method = %method, path = %path, status = response.status().as_u16(), "handled");
        response
    }
}

impl Service<HttpRequest> for Dispatcher {
    type Response = HttpResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Infallible>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.dispatch(req).await) })
    }
}

fn is_supported(method: &Method) -> bool {
    *method == Method::GET || *method == Method::POST || *method == Method::DELETE
}

fn internal_error() -> HttpResponse {
    RequestFailure::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
