//! Main router implementation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{DispatchError, Result};
use crate::handler::{
    handler, BoxFuture, HandleProps, HandleResponse, Handler, IntoHandlers, StopPropagation,
};
use crate::pattern::{Matcher, PatternSpec};
use crate::request::{Method, Request};
use crate::resolve::{resolve, HandleResolve};
use crate::response::Response;

/// Offset applied to the order of routes registered for every method.
///
/// Keeps them ahead of method-specific routes whatever the registration
/// sequence, while preserving insertion order within each group.
const WILDCARD_ORDER_OFFSET: i64 = i64::MIN / 2;

/// Fallback invoked when dispatch fails.
pub type ErrorFallback<P> =
    Arc<dyn Fn(DispatchError, Request, Arc<P>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Fallback invoked when no handler produced a response.
pub type NoMatchFallback<P> =
    Arc<dyn Fn(Request, Arc<P>) -> BoxFuture<'static, Response> + Send + Sync>;

fn error_fallback<P, F, Fut>(f: F) -> ErrorFallback<P>
where
    P: 'static,
    F: Fn(DispatchError, Request, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |error: DispatchError, request: Request, platform: Arc<P>| -> BoxFuture<'static, Response> {
            Box::pin(f(error, request, platform))
        },
    )
}

fn no_match_fallback<P, F, Fut>(f: F) -> NoMatchFallback<P>
where
    P: 'static,
    F: Fn(Request, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |request: Request, platform: Arc<P>| -> BoxFuture<'static, Response> {
            Box::pin(f(request, platform))
        },
    )
}

/// A single registered route.
pub struct Route<P> {
    order: i64,
    pattern: Arc<dyn Matcher>,
    handler: Handler<P>,
}

impl<P> Route<P> {
    /// Execution sort key; unique within a router.
    pub fn order(&self) -> i64 {
        self.order
    }

    /// The compiled pattern.
    pub fn pattern(&self) -> &dyn Matcher {
        self.pattern.as_ref()
    }

    /// The registered handler.
    pub fn handler(&self) -> &Handler<P> {
        &self.handler
    }
}

impl<P> Clone for Route<P> {
    fn clone(&self) -> Self {
        Self {
            order: self.order,
            pattern: Arc::clone(&self.pattern),
            handler: self.handler.clone(),
        }
    }
}

impl<P> fmt::Debug for Route<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("order", &self.order)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Construction options for [`Router`].
pub struct RouterOptions<P> {
    on_error: Option<ErrorFallback<P>>,
    on_no_match: Option<NoMatchFallback<P>>,
    auto_head: bool,
}

impl<P> Default for RouterOptions<P> {
    fn default() -> Self {
        Self {
            on_error: None,
            on_no_match: None,
            auto_head: true,
        }
    }
}

impl<P: 'static> RouterOptions<P> {
    /// Creates the default options: empty 500/404 fallbacks and auto-HEAD.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback used when a handler or the matcher fails.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DispatchError, Request, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.on_error = Some(error_fallback(f));
        self
    }

    /// Sets the fallback used when no handler produced a response.
    #[must_use]
    pub fn on_no_match<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.on_no_match = Some(no_match_fallback(f));
        self
    }

    /// Enables or disables HEAD routes derived from GET routes.
    #[must_use]
    pub fn auto_head(mut self, enabled: bool) -> Self {
        self.auto_head = enabled;
        self
    }
}

/// Generates one registration shortcut per concrete HTTP method.
macro_rules! method_shortcuts {
    ($($(#[$doc:meta])* $name:ident => $method:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                pattern: impl Into<PatternSpec>,
                handlers: impl IntoHandlers<P>,
            ) -> Result<&mut Self> {
                self.register(handlers, Some(Method::$method), Some(pattern.into()))
            }
        )*
    };
}

/// The request router and middleware dispatcher.
///
/// Routes are registered up front, then [`handle`](Self::handle) runs
/// every matching handler in order for each request. Registration takes
/// `&mut self`, so it cannot overlap with dispatch on a shared router.
pub struct Router<P = ()> {
    /// Routes keyed by method; `None` holds routes for every method.
    routes: HashMap<Option<Method>, Vec<Route<P>>>,
    /// Next insertion sequence number.
    counter: i64,
    on_error: ErrorFallback<P>,
    on_no_match: NoMatchFallback<P>,
    auto_head: bool,
}

impl<P: Send + Sync + 'static> Default for Router<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync + 'static> Router<P> {
    /// Creates a router with default options.
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// Creates a router with the given options.
    pub fn with_options(options: RouterOptions<P>) -> Self {
        let routes = std::iter::once(None)
            .chain(Method::ALL.into_iter().map(Some))
            .map(|method| (method, Vec::new()))
            .collect();
        Self {
            routes,
            counter: 0,
            on_error: options
                .on_error
                .unwrap_or_else(|| error_fallback(|_, _, _| async { Response::internal_server_error() })),
            on_no_match: options
                .on_no_match
                .unwrap_or_else(|| no_match_fallback(|_, _| async { Response::not_found() })),
            auto_head: options.auto_head,
        }
    }

    /// Replaces the error fallback.
    pub fn set_on_error<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(DispatchError, Request, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.on_error = error_fallback(f);
        self
    }

    /// Replaces the no-match fallback.
    pub fn set_on_no_match<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Request, Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.on_no_match = no_match_fallback(f);
        self
    }

    /// Returns whether GET routes also register a derived HEAD route.
    pub fn auto_head(&self) -> bool {
        self.auto_head
    }

    /// Returns the routes stored for `method` (`None` for every method),
    /// in insertion order.
    pub fn routes(&self, method: Option<Method>) -> &[Route<P>] {
        self.routes.get(&method).map(Vec::as_slice).unwrap_or_default()
    }

    /// Registers one or more handlers.
    ///
    /// `method: None` applies them to every request regardless of method;
    /// `pattern: None` matches every path. The pattern is compiled here, so
    /// an invalid one fails the call and nothing is registered.
    pub fn register(
        &mut self,
        handlers: impl IntoHandlers<P>,
        method: Option<Method>,
        pattern: Option<PatternSpec>,
    ) -> Result<&mut Self> {
        let pattern = pattern.unwrap_or_default().compile()?;
        for handler in handlers.into_handlers() {
            self.push(method, Arc::clone(&pattern), handler);
        }
        Ok(self)
    }

    /// Registers handlers for a single method.
    pub fn route(
        &mut self,
        method: Method,
        pattern: impl Into<PatternSpec>,
        handlers: impl IntoHandlers<P>,
    ) -> Result<&mut Self> {
        self.register(handlers, Some(method), Some(pattern.into()))
    }

    /// Registers handlers for every method.
    pub fn all(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handlers: impl IntoHandlers<P>,
    ) -> Result<&mut Self> {
        self.register(handlers, None, Some(pattern.into()))
    }

    method_shortcuts! {
        /// Registers GET handlers (and derived HEAD handlers if enabled).
        get => Get;
        /// Registers POST handlers.
        post => Post;
        /// Registers PUT handlers.
        put => Put;
        /// Registers PATCH handlers.
        patch => Patch;
        /// Registers DELETE handlers.
        delete => Delete;
        /// Registers HEAD handlers.
        head => Head;
        /// Registers OPTIONS handlers.
        options => Options;
        /// Registers CONNECT handlers.
        connect => Connect;
        /// Registers TRACE handlers.
        trace => Trace;
    }

    fn next_order(&mut self) -> i64 {
        let order = self.counter;
        self.counter += 1;
        order
    }

    fn push(&mut self, method: Option<Method>, pattern: Arc<dyn Matcher>, handler: Handler<P>) {
        let order = match method {
            Some(_) => self.next_order(),
            None => WILDCARD_ORDER_OFFSET + self.next_order(),
        };
        debug!(
            method = method.map_or("ALL", |m| m.as_str()),
            order,
            pattern = ?pattern,
            "registered route"
        );

        let head = (self.auto_head && method == Some(Method::Get))
            .then(|| (Arc::clone(&pattern), head_handler(handler.clone())));

        self.routes.entry(method).or_default().push(Route {
            order,
            pattern,
            handler,
        });

        if let Some((pattern, handler)) = head {
            let order = self.next_order();
            debug!(order, pattern = ?pattern, "registered derived HEAD route");
            self.routes.entry(Some(Method::Head)).or_default().push(Route {
                order,
                pattern,
                handler,
            });
        }
    }

    /// Wildcard and method routes merged into execution order.
    fn candidates(&self, method: Method) -> Vec<&Route<P>> {
        let mut routes: Vec<&Route<P>> = self
            .routes(None)
            .iter()
            .chain(self.routes(Some(method)))
            .collect();
        routes.sort_by_key(|route| route.order);
        routes
    }

    /// Dispatches a request with a default platform context.
    pub async fn handle(&self, request: Request) -> Response
    where
        P: Default,
    {
        self.handle_with(request, P::default()).await
    }

    /// Dispatches a request.
    ///
    /// Never fails: handler errors, matcher failures and panics (including
    /// one in the no-match fallback) are turned into the error fallback's
    /// response. A request that ends without a response gets the no-match
    /// fallback's. If the error fallback itself panics, an empty 500 is
    /// returned.
    pub async fn handle_with(&self, request: Request, platform: P) -> Response {
        let platform = Arc::new(platform);
        let original = request.clone();

        let outcome = AssertUnwindSafe(self.respond(request, Arc::clone(&platform)))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(DispatchError::from_panic(&*payload)));

        let error = match outcome {
            Ok(response) => return response,
            Err(error) => error,
        };
        warn!(method = %original.method, url = %original.url, %error, "dispatch failed");

        AssertUnwindSafe((self.on_error)(error, original, platform))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let error = DispatchError::from_panic(&*payload);
                warn!(%error, "error fallback failed, sending bare 500");
                Response::internal_server_error()
            })
    }

    /// Runs the handlers, then the no-match fallback if none responded.
    async fn respond(
        &self,
        request: Request,
        platform: Arc<P>,
    ) -> std::result::Result<Response, DispatchError> {
        match self.dispatch(request, Arc::clone(&platform)).await? {
            HandleResolve {
                response: Some(response),
                ..
            } => Ok(response),
            HandleResolve {
                request,
                response: None,
            } => {
                debug!(method = %request.method, url = %request.url, "no response, using fallback");
                Ok((self.on_no_match)(request, platform).await)
            }
        }
    }

    async fn dispatch(
        &self,
        mut request: Request,
        platform: Arc<P>,
    ) -> std::result::Result<HandleResolve, DispatchError> {
        let mut response: Option<Response> = None;
        let stop = StopPropagation::new();
        // Parsed URL for the current request, refreshed when a handler
        // rewrites `request.url`.
        let mut parsed: Option<(String, Url)> = None;

        for route in self.candidates(request.method) {
            if stop.is_stopped() {
                debug!(order = route.order, "propagation stopped");
                break;
            }

            let (source, url) = match parsed.take() {
                Some((source, url)) if source == request.url => (source, url),
                _ => (request.url.clone(), request.parsed_url()?),
            };
            let matched = route.pattern.exec(&url);
            parsed = Some((source, url));
            let Some(matched) = matched? else {
                continue;
            };

            trace!(order = route.order, "invoking handler");
            let props = HandleProps::new(
                request.clone(),
                response.clone(),
                matched,
                Arc::clone(&platform),
                stop.clone(),
            );
            let result = route
                .handler
                .call(props)
                .await
                .map_err(DispatchError::Handler)?;
            let resolved = resolve(request, response, result)
                .await
                .map_err(DispatchError::Handler)?;
            request = resolved.request;
            response = resolved.response;
        }

        Ok(HandleResolve { request, response })
    }
}

/// Wraps a GET handler for HEAD requests: same outcome, body removed.
fn head_handler<P: Send + Sync + 'static>(get: Handler<P>) -> Handler<P> {
    handler(move |props: HandleProps<P>| {
        let get = get.clone();
        async move {
            let request = props.request.clone();
            let response = props.response.clone();
            let result = get.call(props).await?;
            let resolved = resolve(request, response, result).await?;
            Ok(HandleResponse::from(HandleResolve {
                request: resolved.request,
                response: resolved.response.map(Response::without_body),
            }))
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::RouterError;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn record(log: &Log, name: &'static str) -> Handler<()> {
        let log = Arc::clone(log);
        handler(move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok(HandleResponse::Unchanged)
            }
        })
    }

    fn respond(body: &'static str) -> Handler<()> {
        handler(move |_| async move { Ok(Response::text(body).into()) })
    }

    #[tokio::test]
    async fn test_basic_routing() {
        let mut router: Router = Router::new();
        router.get("/", respond("Hello, World!")).unwrap();

        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body_string(), Some("Hello, World!".to_string()));
    }

    #[tokio::test]
    async fn test_match_params_reach_handler() {
        let mut router: Router = Router::new();
        router
            .get(
                "/users/:id",
                handler(|props: HandleProps<()>| async move {
                    let id = props.matched.param("id").unwrap_or("unknown").to_string();
                    Ok(Response::text(format!("User: {id}")).into())
                }),
            )
            .unwrap();

        let res = router.handle(Request::get("/users/123")).await;
        assert_eq!(res.body_string(), Some("User: 123".to_string()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let mut router: Router = Router::new();
        router.get("/", respond("home")).unwrap();

        let res = router.handle(Request::get("/nonexistent")).await;
        assert_eq!(res.status, 404);
        assert!(!res.has_body());

        let res = router.handle(Request::post("/")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_wildcard_routes_run_first() {
        let log: Log = Arc::default();
        let mut router: Router = Router::new();
        router.get("/x", record(&log, "get-1")).unwrap();
        router.register(record(&log, "all-1"), None, None).unwrap();
        router.get("/x", record(&log, "get-2")).unwrap();
        router.all("/x", record(&log, "all-2")).unwrap();

        router.handle(Request::get("/x")).await;
        assert_eq!(*log.lock().unwrap(), ["all-1", "all-2", "get-1", "get-2"]);
    }

    #[tokio::test]
    async fn test_handler_list_registers_in_order() {
        let log: Log = Arc::default();
        let mut router: Router = Router::with_options(RouterOptions::new().auto_head(false));
        router
            .post("/", vec![record(&log, "a"), record(&log, "b"), record(&log, "c")])
            .unwrap();

        let orders: Vec<i64> = router
            .routes(Some(Method::Post))
            .iter()
            .map(Route::order)
            .collect();
        assert_eq!(orders, [0, 1, 2]);

        router.handle(Request::post("/")).await;
        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_orders_are_unique_and_wildcards_negative() {
        let mut router: Router = Router::new();
        router.get("/", respond("a")).unwrap();
        router.register(respond("b"), None, None).unwrap();
        router.head("/", respond("c")).unwrap();

        let get = router.routes(Some(Method::Get))[0].order();
        let head: Vec<i64> = router.routes(Some(Method::Head)).iter().map(Route::order).collect();
        let all = router.routes(None)[0].order();

        assert_eq!(get, 0);
        assert_eq!(head, [1, 3]);
        assert!(all < get);
        assert_eq!(all, WILDCARD_ORDER_OFFSET + 2);
    }

    #[test]
    fn test_auto_head_disabled() {
        let mut router: Router = Router::with_options(RouterOptions::new().auto_head(false));
        router.get("/", respond("a")).unwrap();
        assert!(!router.auto_head());
        assert!(router.routes(Some(Method::Head)).is_empty());
    }

    #[test]
    fn test_invalid_pattern_fails_registration() {
        let mut router: Router = Router::new();
        let err = router.get("no-slash", respond("a")).err().unwrap();
        assert!(matches!(err, RouterError::InvalidPattern { .. }));
        assert!(router.routes(Some(Method::Get)).is_empty());
        assert!(router.routes(Some(Method::Head)).is_empty());
    }

    #[tokio::test]
    async fn test_stop_propagation_skips_later_routes() {
        let log: Log = Arc::default();
        let mut router: Router = Router::new();
        let stopper = {
            let log = Arc::clone(&log);
            handler(move |props: HandleProps<()>| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("stopper");
                    props.stop_propagation();
                    Ok(Response::text("early").into())
                }
            })
        };
        router.get("/", [stopper, record(&log, "after")]).unwrap();

        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.body_string(), Some("early".to_string()));
        router.handle(Request::get("/")).await;
        assert_eq!(*log.lock().unwrap(), ["stopper", "stopper"]);
    }

    #[tokio::test]
    async fn test_clear_response() {
        let mut router: Router = Router::new();
        router
            .get(
                "/",
                [
                    respond("first"),
                    handler(|_| async { Ok(HandleResponse::Clear) }),
                ],
            )
            .unwrap();

        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn test_later_handler_sees_earlier_response() {
        let mut router: Router = Router::new();
        router
            .get(
                "/",
                [
                    respond("inner"),
                    handler(|props: HandleProps<()>| async move {
                        let inner = props.response.and_then(|r| r.body_string()).unwrap_or_default();
                        Ok(Response::text(format!("[{inner}]")).into())
                    }),
                ],
            )
            .unwrap();

        let res = router.handle(Request::get("/")).await;
        assert_eq!(res.body_string(), Some("[inner]".to_string()));
    }

    #[tokio::test]
    async fn test_setters_replace_fallbacks() {
        let mut router: Router = Router::new();
        router.set_on_no_match(|_, _| async { Response::new(410) });
        router.set_on_error(|_, _, _| async { Response::new(503) });
        router
            .post("/fail", handler(|_| async { Err("nope".into()) }))
            .unwrap();

        assert_eq!(router.handle(Request::get("/gone")).await.status, 410);
        assert_eq!(router.handle(Request::post("/fail")).await.status, 503);
    }

    #[tokio::test]
    async fn test_platform_reaches_handlers_and_fallbacks() {
        #[derive(Debug, Default)]
        struct Platform {
            region: &'static str,
        }

        let mut router: Router<Platform> = Router::with_options(RouterOptions::new().on_no_match(
            |_, platform: Arc<Platform>| async move { Response::text(platform.region).status(404) },
        ));
        router
            .get(
                "/",
                handler(|props: HandleProps<Platform>| async move {
                    Ok(Response::text(props.platform.region).into())
                }),
            )
            .unwrap();

        let res = router
            .handle_with(Request::get("/"), Platform { region: "eu" })
            .await;
        assert_eq!(res.body_string(), Some("eu".to_string()));

        let res = router
            .handle_with(Request::get("/missing"), Platform { region: "us" })
            .await;
        assert_eq!((res.status, res.body_string()), (404, Some("us".to_string())));
    }
}
