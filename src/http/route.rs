use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use super::response::{HandlerError, HttpRequest, HttpResponse};
use super::ServerError;

/// Positional capture groups from a matched route pattern.
///
/// Indexing follows regex group numbering: group 1 is the first capture.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captures(Vec<Option<String>>);

impl Captures {
    /// Build captures directly (group 1 first).
    pub fn new<I: IntoIterator<Item = Option<String>>>(groups: I) -> Self {
        Self(groups.into_iter().collect())
    }

    /// Value of capture group `group`, if it participated in the match.
    pub fn get(&self, group: usize) -> Option<&str> {
        group.checked_sub(1).and_then(|i| self.0.get(i)).and_then(|g| g.as_deref())
    }

    /// Number of capture groups in the pattern.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the pattern had no capture groups.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Handles requests for one route.
#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    /// Answer `request`. Returning an error lets the dispatcher pick the status.
    async fn handle(
        &self,
        request: HttpRequest,
        captures: Captures,
    ) -> Result<HttpResponse, HandlerError>;
}

#[async_trait]
impl<H: RouteHandler + ?Sized> RouteHandler for Arc<H> {
    async fn handle(
        &self,
        request: HttpRequest,
        captures: Captures,
    ) -> Result<HttpResponse, HandlerError> {
        (**self).handle(request, captures).await
    }
}

/// Adapt an async closure into a [`RouteHandler`].
pub fn route_fn<F, Fut>(f: F) -> RouteFn<F>
where
    F: Fn(HttpRequest, Captures) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, HandlerError>> + Send + 'static,
{
    RouteFn { f }
}

/// Handler returned by [`route_fn`].
#[derive(Clone)]
pub struct RouteFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RouteHandler for RouteFn<F>
where
    F: Fn(HttpRequest, Captures) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        request: HttpRequest,
        captures: Captures,
    ) -> Result<HttpResponse, HandlerError> {
        (self.f)(request, captures).await
    }
}

#[derive(Clone)]
struct Route {
    source: String,
    pattern: Regex,
    handler: Arc<dyn RouteHandler>,
}

/// Ordered route table. The first pattern matching the whole request path wins.
///
/// Built once at startup, then handed to the server; it is not mutated while
/// serving.
#[derive(Clone, Default)]
pub struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. `pattern` is a regex matched against the full path.
    /// A later pattern that matches the same paths as an earlier one is
    /// unreachable.
    pub fn add<H: RouteHandler>(
        &mut self,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, ServerError> {
        self.add_shared(pattern, Arc::new(handler))
    }

    /// Append a route with an already shared handler.
    pub fn add_shared(
        &mut self,
        pattern: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<&mut Self, ServerError> {
        let compiled = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            ServerError::Pattern { pattern: pattern.to_string(), reason: e.to_string() }
        })?;
        self.routes.push(Route { source: pattern.to_string(), pattern: compiled, handler });
        Ok(self)
    }

    /// First route matching `path`, with its captures.
    pub fn find(&self, path: &str) -> Option<(Arc<dyn RouteHandler>, Captures)> {
        self.routes.iter().find_map(|route| {
            route.pattern.captures(path).map(|caps| {
                let groups = caps.iter().skip(1).map(|g| g.map(|m| m.as_str().to_string()));
                (route.handler.clone(), Captures::new(groups))
            })
        })
    }

    /// Registered patterns, in match order.
    pub fn patterns(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.source.as_str()).collect()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no route has been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routes").field("patterns", &self.patterns()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn fixed(body: &'static str) -> impl RouteHandler {
        route_fn(move |_req, _caps| async move { Ok(HttpResponse::text(StatusCode::OK, body)) })
    }

    #[test]
    fn patterns_are_anchored() {
        let mut routes = Routes::new();
        routes.add("/varz", fixed("varz")).unwrap();
        assert!(routes.find("/varz").is_some());
        assert!(routes.find("/varz/extra").is_none());
        assert!(routes.find("/prefix/varz").is_none());
    }

    #[test]
    fn optional_groups_are_positional() {
        let mut routes = Routes::new();
        routes.add("/items(?:/([^/]+))?", fixed("items")).unwrap();

        let (_, caps) = routes.find("/items/abc").unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps.get(1), Some("abc"));

        let (_, caps) = routes.find("/items").unwrap();
        assert_eq!(caps.get(1), None);
        assert_eq!(caps.get(0), None);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let mut routes = Routes::new();
        let err = routes.add("/broken(", fixed("x")).err().unwrap();
        assert!(matches!(err, ServerError::Pattern { .. }));
    }

    #[tokio::test]
    async fn first_registered_match_wins() {
        let mut routes = Routes::new();
        routes.add("/a/.*", fixed("first")).unwrap().add("/a/b", fixed("second")).unwrap();

        let (handler, caps) = routes.find("/a/b").unwrap();
        let request = http::Request::new(bytes::Bytes::new());
        let response = handler.handle(request, caps).await.unwrap();
        assert_eq!(response.body().as_ref(), b"first");
        assert_eq!(routes.patterns(), vec!["/a/.*", "/a/b"]);
    }
}
