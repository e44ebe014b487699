//! Error types for registration and dispatch.

use thiserror::Error;

/// A type-erased error returned by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration errors raised while building a router.
///
/// These are returned synchronously from registration calls and are
/// never seen by the dispatch engine.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The pattern specification could not be compiled.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The method name is not one of the supported HTTP methods.
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// The pattern matcher could not evaluate a request.
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    /// The request URL is neither absolute nor a rooted path.
    #[error("invalid request url `{url}`: {reason}")]
    InvalidUrl {
        /// The raw request URL.
        url: String,
        /// Parser message.
        reason: String,
    },
}

/// A failure caught while dispatching a single request.
///
/// Passed to the error fallback; never propagated to the caller of
/// [`Router::handle`](crate::Router::handle).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler (or a deferred response it returned) failed.
    #[error("handler failed: {0}")]
    Handler(BoxError),

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// The pattern matcher rejected the request.
    #[error(transparent)]
    Match(#[from] MatchError),
}

impl DispatchError {
    /// Builds a panic error from a caught unwind payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panic(message)
    }
}
