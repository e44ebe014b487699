//! The handler contract.
//!
//! A handler receives [`HandleProps`] and returns a [`HandleResponse`]
//! describing how to update the running request/response state:
//!
//! ```ignore
//! use oxide_dispatch::{handler, HandleResponse, Response};
//!
//! let log = handler(|props| async move {
//!     tracing::info!("{} {}", props.request.method, props.request.url);
//!     Ok(HandleResponse::Unchanged)
//! });
//!
//! let hello = handler(|_props| async move { Ok(Response::text("Hello").into()) });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::BoxError;
use crate::pattern::PatternMatch;
use crate::request::Request;
use crate::resolve::HandleResolve;
use crate::response::Response;

/// A boxed future for async handler operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler invocation produces.
pub type HandleResult = Result<HandleResponse, BoxError>;

/// Per-request flag that halts further handler invocation.
///
/// Clones share the same flag. A fresh one is created for every request.
#[derive(Debug, Clone, Default)]
pub struct StopPropagation(Arc<AtomicBool>);

impl StopPropagation {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Arguments passed to every handler invocation.
pub struct HandleProps<P> {
    /// The current request (possibly rewritten by earlier handlers).
    pub request: Request,
    /// The response produced so far, if any.
    pub response: Option<Response>,
    /// Groups captured by this route's pattern.
    pub matched: PatternMatch,
    /// Caller-supplied platform context.
    pub platform: Arc<P>,
    stop: StopPropagation,
}

impl<P> HandleProps<P> {
    /// Creates props for one invocation.
    pub fn new(
        request: Request,
        response: Option<Response>,
        matched: PatternMatch,
        platform: Arc<P>,
        stop: StopPropagation,
    ) -> Self {
        Self {
            request,
            response,
            matched,
            platform,
            stop,
        }
    }

    /// Skips every remaining handler for this request.
    ///
    /// The current handler's return value is still applied.
    pub fn stop_propagation(&self) {
        self.stop.stop();
    }
}

impl<P: fmt::Debug> fmt::Debug for HandleProps<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleProps")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("matched", &self.matched)
            .field("platform", &self.platform)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

/// How a [`HandleResponse::Replace`] updates the response.
pub enum ResponseUpdate {
    /// Leave the current response as it is.
    Keep,
    /// Remove any current response.
    Clear,
    /// Replace the current response.
    Set(Response),
    /// Await the future, then set (`Some`) or clear (`None`).
    Deferred(BoxFuture<'static, Result<Option<Response>, BoxError>>),
}

impl ResponseUpdate {
    /// Wraps a future producing the response.
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Option<Response>, BoxError>> + Send + 'static,
    {
        Self::Deferred(Box::pin(fut))
    }
}

impl fmt::Debug for ResponseUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => f.write_str("Keep"),
            Self::Clear => f.write_str("Clear"),
            Self::Set(res) => f.debug_tuple("Set").field(res).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The value returned by a handler.
#[derive(Debug)]
pub enum HandleResponse {
    /// No change to request or response.
    Unchanged,
    /// Replace the response.
    Respond(Response),
    /// Remove any response set by an earlier handler.
    Clear,
    /// Optionally replace the request, and update the response.
    Replace {
        /// Replacement request, if any.
        request: Option<Request>,
        /// Response update.
        response: ResponseUpdate,
    },
}

impl HandleResponse {
    /// Replaces the request and leaves the response alone.
    pub fn rewrite(request: Request) -> Self {
        Self::Replace {
            request: Some(request),
            response: ResponseUpdate::Keep,
        }
    }

    /// Replaces both request and response.
    pub fn replace(request: Request, response: Response) -> Self {
        Self::Replace {
            request: Some(request),
            response: ResponseUpdate::Set(response),
        }
    }
}

impl From<()> for HandleResponse {
    fn from((): ()) -> Self {
        Self::Unchanged
    }
}

impl From<Response> for HandleResponse {
    fn from(response: Response) -> Self {
        Self::Respond(response)
    }
}

impl From<Option<Response>> for HandleResponse {
    fn from(response: Option<Response>) -> Self {
        response.map_or(Self::Clear, Self::Respond)
    }
}

impl From<Request> for HandleResponse {
    fn from(request: Request) -> Self {
        Self::rewrite(request)
    }
}

impl From<HandleResolve> for HandleResponse {
    fn from(resolved: HandleResolve) -> Self {
        Self::Replace {
            request: Some(resolved.request),
            response: resolved
                .response
                .map_or(ResponseUpdate::Clear, ResponseUpdate::Set),
        }
    }
}

type HandlerFn<P> = dyn Fn(HandleProps<P>) -> BoxFuture<'static, HandleResult> + Send + Sync;

/// A registered handler. Cheap to clone.
pub struct Handler<P>(Arc<HandlerFn<P>>);

impl<P: 'static> Handler<P> {
    /// Wraps an async function as a handler.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HandleProps<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandleResult> + Send + 'static,
    {
        Self(Arc::new(
            move |props: HandleProps<P>| -> BoxFuture<'static, HandleResult> {
                Box::pin(f(props))
            },
        ))
    }

    /// Invokes the handler.
    pub fn call(&self, props: HandleProps<P>) -> BoxFuture<'static, HandleResult> {
        (self.0)(props)
    }
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> fmt::Debug for Handler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// Shorthand for [`Handler::new`].
pub fn handler<P, F, Fut>(f: F) -> Handler<P>
where
    P: 'static,
    F: Fn(HandleProps<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandleResult> + Send + 'static,
{
    Handler::new(f)
}

/// One handler or an ordered list of handlers.
pub trait IntoHandlers<P> {
    /// Returns the handlers in registration order.
    fn into_handlers(self) -> Vec<Handler<P>>;
}

impl<P> IntoHandlers<P> for Handler<P> {
    fn into_handlers(self) -> Vec<Handler<P>> {
        vec![self]
    }
}

impl<P> IntoHandlers<P> for Vec<Handler<P>> {
    fn into_handlers(self) -> Vec<Handler<P>> {
        self
    }
}

impl<P, const N: usize> IntoHandlers<P> for [Handler<P>; N] {
    fn into_handlers(self) -> Vec<Handler<P>> {
        self.into()
    }
}
