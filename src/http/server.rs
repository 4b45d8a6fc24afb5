use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::response::RequestFailure;
use super::route::Routes;
use super::ServerError;

/// Largest request body accepted by default (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// The control-plane HTTP listener.
///
/// Serves one request per connection and always closes the connection after
/// the response. Each connection runs on its own task.
#[derive(Debug)]
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    accept_task: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Bind `addr` and start serving `routes`.
    pub async fn bind<A: ToSocketAddrs>(addr: A, routes: Routes) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener, routes)
    }

    /// Serve `routes` on an already bound listener.
    ///
    /// Lets callers learn the bound address (e.g. for a component announce)
    /// before the route table is final.
    pub fn from_listener(listener: TcpListener, routes: Routes) -> Result<Self, ServerError> {
        Self::from_listener_with_body_limit(listener, routes, DEFAULT_MAX_BODY_BYTES)
    }

    /// Like [`from_listener`](Self::from_listener), answering `413` to
    /// requests whose body exceeds `max_body_bytes`.
    pub fn from_listener_with_body_limit(
        listener: TcpListener,
        routes: Routes,
        max_body_bytes: usize,
    ) -> Result<Self, ServerError> {
        let local_addr = listener.local_addr()?;
        let (shutdown, stop) = oneshot::channel();
        let dispatcher = Dispatcher::new(routes);
        info!(target: "switchboard::http", addr = %local_addr, routes = dispatcher.routes().len(), "listening");
        let accept_task = tokio::spawn(accept_loop(listener, dispatcher, max_body_bytes, stop));
        Ok(Self { local_addr, shutdown: Some(shutdown), accept_task: Some(accept_task) })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Connections already accepted finish on their own.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        info!(target: "switchboard::http", addr = %self.local_addr, "closed");
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_body_bytes: usize,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(stream, peer, dispatcher.clone(), max_body_bytes));
                }
                Err(e) => {
                    warn!(target: "switchboard::http", error = %e, "accept failed");
                }
            },
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    max_body_bytes: usize,
) {
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<_, Infallible>(respond(dispatcher, request, max_body_bytes).await) }
    });
    let result = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service)
        .await;
    if let Err(e) = result {
        debug!(target: "switchboard::http", peer = %peer, error = %e, "connection ended with error");
    }
}

async fn respond(
    dispatcher: Dispatcher,
    request: hyper::Request<Incoming>,
    max_body_bytes: usize,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            debug!(target: "switchboard::http", path = %parts.uri.path(), limit = max_body_bytes, "request body too large");
            return RequestFailure::new(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
                .into_response()
                .into_wire();
        }
        Err(e) => {
            debug!(target: "switchboard::http", error = %e, "unreadable request body");
            return RequestFailure::bad_request("Bad Request").into_response().into_wire();
        }
    };
    let response = match dispatcher.oneshot(http::Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    response.into_wire()
}
