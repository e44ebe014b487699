//! Folding handler return values into request/response state.

use crate::error::BoxError;
use crate::handler::{HandleResponse, ResponseUpdate};
use crate::request::Request;
use crate::response::Response;

/// Canonical request/response state after a handler has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleResolve {
    /// The request later handlers will see.
    pub request: Request,
    /// The response so far; `None` if unset or cleared.
    pub response: Option<Response>,
}

/// Applies a handler's return value to the current state.
///
/// Every [`HandleResponse`] shape maps to exactly one outcome. Feeding an
/// already resolved state back in (via `HandleResponse::from`) yields the
/// same state. Only a failing [`ResponseUpdate::Deferred`] can error.
pub async fn resolve(
    request: Request,
    response: Option<Response>,
    result: HandleResponse,
) -> Result<HandleResolve, BoxError> {
    let resolved = match result {
        HandleResponse::Unchanged => HandleResolve { request, response },
        HandleResponse::Respond(next) => HandleResolve {
            request,
            response: Some(next),
        },
        HandleResponse::Clear => HandleResolve {
            request,
            response: None,
        },
        HandleResponse::Replace {
            request: next_request,
            response: update,
        } => HandleResolve {
            request: next_request.unwrap_or(request),
            response: match update {
                ResponseUpdate::Keep => response,
                ResponseUpdate::Clear => None,
                ResponseUpdate::Set(next) => Some(next),
                ResponseUpdate::Deferred(fut) => fut.await?,
            },
        },
    };
    Ok(resolved)
}
