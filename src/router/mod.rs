//! Request routing: ordered route and error chains with an explicit continuation
//! protocol.
//!
//! A [`Router`] owns two ordered lists:
//!
//! - **routes**: each pairs a [`Pattern`] with a handler. For every request the
//!   dispatcher walks the list in registration order, invoking each handler whose
//!   pattern matches. A handler returning [`Flow::Continue`] lets later routes run
//!   (middleware-style annotation, auth checks); [`Flow::Stop`] ends the chain.
//!   If nothing stops the chain, the default route runs, and it fails with
//!   [`Error::NotFound`].
//! - **error routes**: every entry is a candidate for every failure. They run in
//!   order with the same continuation rules, falling back to the default error
//!   handler, which maps [`ErrorKind`](crate::error::ErrorKind) to a status.
//!
//! After any handler returns, a closed response ends the chain regardless of the
//! returned [`Flow`].
//!
//! # Examples
//!
//! ```rust
//! use waypoint::router::{Flow, Router};
//!
//! # fn main() -> Result<(), waypoint::router::PatternError> {
//! let mut router = Router::new();
//! router.get(r"/users/(\d+)", |caps, _req, res| {
//!     Box::pin(async move {
//!         res.write_body_text(&format!("user {}", &caps[0])).await?;
//!         Ok(Flow::Stop)
//!     })
//! })?;
//! # Ok(())
//! # }
//! ```

mod handler;
mod pattern;

pub use handler::{Flow, Handler, HandlerResult, RequestIds, Trigger};
pub use pattern::{Captures, Pattern, PatternError};

use std::path::PathBuf;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::error::Error;
use crate::http::{BoxFuture, Request, RequestParts, Response, ResponseSink};
use crate::security::Cors;
use crate::static_content::{StaticDirectory, StaticFile};

/// A pattern bound to a route-shaped handler.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    /// A route whose handler receives the URL captures.
    pub fn new<F>(pattern: Pattern, handler: F) -> Self
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self {
            pattern,
            handler: Handler::captures(handler),
        }
    }

    /// A route whose handler only needs the request and response.
    pub fn exchange<F>(pattern: Pattern, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self {
            pattern,
            handler: Handler::exchange(handler),
        }
    }

    /// Matches against `path?query` instead of the bare path.
    #[must_use]
    pub fn match_full_url(mut self, match_full_url: bool) -> Self {
        self.pattern = self.pattern.match_full_url(match_full_url);
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// A failure-shaped handler in the error chain. Always a candidate.
#[derive(Debug, Clone)]
pub struct ErrorRoute {
    handler: Handler,
}

impl ErrorRoute {
    pub fn new<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Handler::failure(handler),
        }
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Route table, dispatchers, and per-request lifecycle.
///
/// Registration takes `&mut self`. To serve, move the router into an
/// [`Arc`](std::sync::Arc); from then on the tables are read-only, so no
/// request can observe a half-updated chain.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    error_routes: Vec<ErrorRoute>,
    default_route: Handler,
    error_handler: Handler,
    request_ids: RequestIds,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// An empty router: every request ends in a 404.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            error_routes: Vec::new(),
            default_route: Handler::exchange(not_found),
            error_handler: Handler::failure(default_error_handler),
            request_ids: RequestIds::new(),
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn error_routes(&self) -> &[ErrorRoute] {
        &self.error_routes
    }

    /// Appends `route` to the end of the chain.
    pub fn add_route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Puts `route` in front of every existing route.
    pub fn prepend_route(&mut self, route: Route) -> &mut Self {
        self.routes.insert(0, route);
        self
    }

    /// Inserts `route` at `index`, or appends it if `index` is past the end.
    pub fn insert_route(&mut self, index: usize, route: Route) -> &mut Self {
        let index = index.min(self.routes.len());
        self.routes.insert(index, route);
        self
    }

    pub fn clear_routes(&mut self) -> &mut Self {
        self.routes.clear();
        self
    }

    /// Registers a regex route whose handler receives the captures.
    ///
    /// # Arguments
    ///
    /// - `method`: Method regex, or `None` for any method.
    /// - `url`: Path regex, implicitly anchored at both ends.
    /// - `handler`: Async closure returning a [`Flow`].
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if either regex fails to compile.
    pub fn route<F>(&mut self, method: Option<&str>, url: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        let pattern = Pattern::regex(method, Some(url))?;
        Ok(self.add_route(Route::new(pattern, handler)))
    }

    /// Like [`route`](Self::route), for handlers that ignore captures.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if either regex fails to compile.
    pub fn route_fn<F>(&mut self, method: Option<&str>, url: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        let pattern = Pattern::regex(method, Some(url))?;
        Ok(self.add_route(Route::exchange(pattern, handler)))
    }

    /// Registers a literal route. The method and path must match byte for byte.
    pub fn exact_route<F>(&mut self, method: Option<&str>, url: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.add_route(Route::exchange(Pattern::exact(method, Some(url)), handler))
    }

    /// Registers a `GET` regex route.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if `url` fails to compile.
    pub fn get<F>(&mut self, url: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.route(Some("GET"), url, handler)
    }

    /// Registers a `POST` regex route.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if `url` fails to compile.
    pub fn post<F>(&mut self, url: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.route(Some("POST"), url, handler)
    }

    /// Registers a `PUT` regex route.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if `url` fails to compile.
    pub fn put<F>(&mut self, url: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.route(Some("PUT"), url, handler)
    }

    /// Registers a `DELETE` regex route.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if `url` fails to compile.
    pub fn delete<F>(&mut self, url: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.route(Some("DELETE"), url, handler)
    }

    pub fn add_error_route(&mut self, route: ErrorRoute) -> &mut Self {
        self.error_routes.push(route);
        self
    }

    pub fn prepend_error_route(&mut self, route: ErrorRoute) -> &mut Self {
        self.error_routes.insert(0, route);
        self
    }

    pub fn clear_error_routes(&mut self) -> &mut Self {
        self.error_routes.clear();
        self
    }

    /// Appends a failure handler to the error chain.
    pub fn error_route<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.add_error_route(ErrorRoute::new(handler))
    }

    /// Replaces the handler that runs when no route stops the chain.
    pub fn set_default_route<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.default_route = Handler::exchange(handler);
        self
    }

    /// Replaces the handler that runs when no error route stops the chain.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.error_handler = Handler::failure(handler);
        self
    }

    /// Serves a single file at an exact `GET` path.
    pub fn static_file(&mut self, url: &str, path: impl Into<PathBuf>) -> &mut Self {
        self.add_route(StaticFile::new(path).route(url))
    }

    /// Serves a directory tree below the URL prefix `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the mount pattern fails to compile.
    pub fn static_directory(&mut self, url: &str, directory: StaticDirectory) -> Result<&mut Self, PatternError> {
        let route = directory.route(url)?;
        Ok(self.add_route(route))
    }

    /// Enables CORS for every URL matching one of `endpoints` (all URLs if empty).
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if an endpoint regex fails to compile.
    pub fn allow_cors(&mut self, endpoints: &[&str]) -> Result<&mut Self, PatternError> {
        endpoints
            .iter()
            .fold(Cors::new(), |cors, endpoint| cors.endpoint(*endpoint))
            .install(self)?;
        Ok(self)
    }

    /// Hands out the next request id.
    pub fn next_request_id(&self) -> u64 {
        self.request_ids.next_id()
    }

    /// Runs the route chain for one request.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure, including the default route's
    /// [`Error::NotFound`].
    pub async fn dispatch(&self, request: &mut Request, response: &mut Response) -> Result<(), Error> {
        for (index, route) in self.routes.iter().enumerate() {
            let Some(captures) = route.pattern.matches(request) else {
                continue;
            };
            debug!(
                request_id = request.id(),
                route = index,
                pattern = route.pattern.url_pattern(),
                "route matched"
            );

            let flow = route
                .handler
                .call(Trigger::Matched(captures), request, response)
                .await?;
            if flow == Flow::Stop || !response.is_open() {
                return Ok(());
            }
        }

        self.default_route
            .call(Trigger::Matched(Captures::default()), request, response)
            .await
            .map(drop)
    }

    /// Runs the error chain for a failure raised by [`dispatch`](Self::dispatch).
    ///
    /// # Errors
    ///
    /// Returns a failure raised by an error handler itself.
    pub async fn dispatch_error(
        &self,
        error: &Error,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), Error> {
        for route in &self.error_routes {
            let flow = route
                .handler
                .call(Trigger::Failed(error), request, response)
                .await?;
            if flow == Flow::Stop || !response.is_open() {
                return Ok(());
            }
        }

        self.error_handler
            .call(Trigger::Failed(error), request, response)
            .await
            .map(drop)
    }

    /// Full lifecycle of one exchange: dispatch, error chain on failure, close.
    ///
    /// Never fails. A failure inside the error chain, or while closing, is logged.
    pub async fn handle(&self, request: &mut Request, response: &mut Response) {
        debug!(
            request_id = request.id(),
            client = ?request.client_addr(),
            method = %request.method(),
            path = request.path(),
            "request received"
        );

        if let Err(error) = self.dispatch(request, response).await {
            if let Err(secondary) = self.dispatch_error(&error, request, response).await {
                warn!(
                    request_id = request.id(),
                    %error,
                    %secondary,
                    "error handler failed"
                );
            }
        }

        if response.is_open() {
            if let Err(error) = response.close().await {
                warn!(request_id = request.id(), %error, "failed to close response");
            }
        }
    }

    /// Builds a request and response around host-supplied parts and handles them.
    pub async fn serve<B, S>(&self, parts: RequestParts, body: B, sink: S)
    where
        B: AsyncRead + Send + Unpin + 'static,
        S: ResponseSink + 'static,
    {
        let mut request = Request::new(parts, body, self.next_request_id());
        let mut response = Response::new(sink);
        self.handle(&mut request, &mut response).await;
    }
}

fn not_found<'a>(request: &'a mut Request, _response: &'a mut Response) -> BoxFuture<'a, HandlerResult> {
    let path = request.path().to_owned();
    Box::pin(async move { Err(Error::NotFound(format!("no route matched for '{path}'"))) })
}

fn default_error_handler<'a>(
    error: &'a Error,
    request: &'a mut Request,
    response: &'a mut Response,
) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let kind = error.kind();
        if response.is_committed() {
            warn!(
                request_id = request.id(),
                ?kind,
                %error,
                "handler failed after the response was committed"
            );
            return Ok(Flow::Stop);
        }

        warn!(request_id = request.id(), ?kind, %error, "handler failed");
        let allow_cors = response.head().is_some_and(|head| head.allow_cors);
        response.reset();
        response.set_allow_cors(allow_cors).set_status(kind.status());
        response.write_body_text(kind.message()).await?;
        Ok(Flow::Stop)
    })
}
