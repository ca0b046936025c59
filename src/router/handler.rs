//! Handler shapes and the continuation protocol.
//!
//! Every handler resolves to a [`Flow`]: [`Flow::Continue`] lets the dispatcher
//! try later routes, [`Flow::Stop`] ends the chain for this request.
//!
//! Handlers are plain closures returning a boxed future that borrows the request
//! and response for the duration of the call:
//!
//! ```rust
//! use waypoint::router::{Flow, Handler};
//!
//! let hello = Handler::exchange(|_req, res| {
//!     Box::pin(async move {
//!         res.write_body_text("hello").await?;
//!         Ok(Flow::Stop)
//!     })
//! });
//! assert!(hello.is_route_shaped());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::pattern::Captures;
use crate::error::Error;
use crate::http::{BoxFuture, Request, Response};

/// What the dispatcher does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Keep evaluating later routes.
    Continue,
    /// This handler fully handled the request.
    Stop,
}

/// Return type of every handler.
pub type HandlerResult = Result<Flow, Error>;

type CapturesFn = dyn for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
    + Send
    + Sync;

type ExchangeFn =
    dyn for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync;

type FailureFn = dyn for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
    + Send
    + Sync;

/// The event a handler is invoked for.
#[derive(Debug)]
pub enum Trigger<'e> {
    /// A route pattern matched, with its captures.
    Matched(Captures),
    /// A handler earlier in the request failed.
    Failed(&'e Error),
}

/// A type-erased async handler in one of three shapes.
///
/// Cloning is cheap; the closure itself sits behind an [`Arc`].
#[derive(Clone)]
pub enum Handler {
    /// Receives the route's captures.
    Captures(Arc<CapturesFn>),
    /// Ignores captures.
    Exchange(Arc<ExchangeFn>),
    /// Receives the failure being handled.
    Failure(Arc<FailureFn>),
}

impl Handler {
    pub fn captures<F>(handler: F) -> Self
    where
        F: for<'a> Fn(Captures, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self::Captures(Arc::new(handler))
    }

    pub fn exchange<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self::Exchange(Arc::new(handler))
    }

    pub fn failure<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self::Failure(Arc::new(handler))
    }

    /// `true` for handlers a [`Trigger::Matched`] can reach.
    pub fn is_route_shaped(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// Invokes the handler.
    ///
    /// A trigger the handler's shape cannot accept (captures for a failure
    /// handler, a failure for a route handler) is answered with
    /// [`Flow::Continue`] without running anything.
    pub async fn call(
        &self,
        trigger: Trigger<'_>,
        request: &mut Request,
        response: &mut Response,
    ) -> HandlerResult {
        match (self, trigger) {
            (Self::Captures(f), Trigger::Matched(captures)) => f(captures, request, response).await,
            (Self::Exchange(f), Trigger::Matched(_)) => f(request, response).await,
            (Self::Failure(f), Trigger::Failed(error)) => f(error, request, response).await,
            _ => Ok(Flow::Continue),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Captures(_) => "Captures",
            Self::Exchange(_) => "Exchange",
            Self::Failure(_) => "Failure",
        };
        f.debug_tuple("Handler").field(&format_args!("{shape}")).finish()
    }
}

/// Monotonic request-id source shared by every connection of one router.
#[derive(Debug, Default)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the new id. The first id is 1.
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
