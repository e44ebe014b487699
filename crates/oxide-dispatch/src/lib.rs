//! # oxide-dispatch
//!
//! Ordered, mutation-aware request dispatch for HTTP servers.
//!
//! This crate provides:
//! - Route registration per HTTP method, plus routes that run for every method
//! - URL pattern matching with named parameters and wildcards
//! - Handlers that can rewrite the request and set, replace or clear the response
//! - Early termination with stop propagation
//! - Automatic HEAD routes derived from GET routes
//! - Error and no-match fallbacks, so dispatch always yields a response
//!
//! It does not listen on sockets or parse HTTP: it consumes a [`Request`]
//! and produces a [`Response`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use oxide_dispatch::{handler, HandleProps, HandleResponse, Request, Response, Router};
//!
//! let mut router: Router = Router::new();
//!
//! // Runs for every request, before any method route.
//! router.register(
//!     handler(|props: HandleProps<()>| async move {
//!         tracing::info!("{} {}", props.request.method, props.request.url);
//!         Ok(HandleResponse::Unchanged)
//!     }),
//!     None,
//!     None,
//! )?;
//!
//! router.get(
//!     "/items/:id",
//!     handler(|props: HandleProps<()>| async move {
//!         let id = props.matched.param("id").unwrap_or_default().to_string();
//!         Ok(Response::text(id).into())
//!     }),
//! )?;
//!
//! let response = router.handle(Request::get("/items/42")).await;
//! assert_eq!(response.body_string().as_deref(), Some("42"));
//!
//! // Derived from the GET route: same status and headers, no body.
//! let response = router.handle(Request::head("/items/42")).await;
//! assert!(!response.has_body());
//! ```
//!
//! ## Execution order
//!
//! Every route gets a sequence number when registered. Routes registered
//! without a method always run before method routes; within each group,
//! routes run in registration order. Each matching handler sees the
//! request and response left by the previous one.
//!
//! ## Stopping early
//!
//! ```ignore
//! let auth = handler(|props: HandleProps<()>| async move {
//!     if props.request.get_header("Authorization").is_none() {
//!         props.stop_propagation();
//!         return Ok(Response::new(401).into());
//!     }
//!     Ok(HandleResponse::Unchanged)
//! });
//! ```
//!
//! ## Fallbacks
//!
//! ```ignore
//! use oxide_dispatch::{Router, RouterOptions, Response};
//!
//! let router: Router = Router::with_options(
//!     RouterOptions::new()
//!         .on_no_match(|_req, _platform| async { Response::text("nothing here").status(404) })
//!         .on_error(|err, _req, _platform| async move {
//!             Response::text(err.to_string()).status(500)
//!         })
//!         .auto_head(false),
//! );
//! ```

mod error;
mod handler;
mod pattern;
mod request;
mod resolve;
mod response;
mod router;

pub use error::{BoxError, DispatchError, MatchError, Result, RouterError};
pub use handler::{
    handler, BoxFuture, HandleProps, HandleResponse, HandleResult, Handler, IntoHandlers,
    ResponseUpdate, StopPropagation,
};
pub use pattern::{
    ComponentMatch, Matcher, PatternInit, PatternMatch, PatternSpec, UrlPattern, MATCH_ALL,
};
pub use request::{Method, Request};
pub use resolve::{resolve, HandleResolve};
pub use response::Response;
pub use router::{ErrorFallback, NoMatchFallback, Route, Router, RouterOptions};
