//! Request dispatcher for queries and mutations.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use courier_core::{InvokeError, Namespace, QueryArgs, RouteTable, RpcError};
use serde_json::Value;

/// How a request method maps onto the route namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodClass {
    /// Safe fetch, resolved against queries.
    Read,
    /// Create/update/delete, resolved against mutations.
    Write,
}

impl MethodClass {
    fn of(method: &Method) -> Option<Self> {
        if method == Method::GET {
            Some(Self::Read)
        } else if method == Method::POST || method == Method::PUT || method == Method::DELETE {
            Some(Self::Write)
        } else {
            None
        }
    }
}

/// Operation name from a request path: the first segment after `/`.
fn operation_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix('/')?.split('/').next()?;
    (!name.is_empty()).then_some(name)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(RpcError::not_found())).into_response()
}

fn invalid_input(detail: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(RpcError::kind("InvalidInput", detail.to_string())),
    )
        .into_response()
}

/// Turn a handler invocation into a response.
///
/// Handler errors travel with a success status, the same as outputs.
fn reply(route: &str, outcome: Result<Value, InvokeError>) -> Response {
    match outcome {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(InvokeError::Handler(err)) => {
            tracing::debug!(route, error = %err, "Handler returned an error value");
            (StatusCode::OK, Json(err)).into_response()
        }
        Err(InvokeError::InvalidInput(e)) => {
            tracing::warn!(route, "Invalid input: {e}");
            invalid_input(e)
        }
        Err(InvokeError::Encode(e)) => {
            tracing::error!(route, "Failed to encode output: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RpcError::kind("Encoding", e.to_string())),
            )
                .into_response()
        }
    }
}

/// Fallback handler serving every `/<operation>` request.
///
/// The body is buffered in full by the extractor before this runs, so a
/// mutation never sees a partial body.
pub(crate) async fn dispatch<C>(
    State(routes): State<Arc<RouteTable<C>>>,
    method: Method,
    uri: Uri,
    query: Result<Query<QueryArgs>, QueryRejection>,
    body: Bytes,
) -> Response
where
    C: Send + Sync + 'static,
{
    if uri.path() == "/" {
        return StatusCode::NO_CONTENT.into_response();
    }

    let Some(class) = MethodClass::of(&method) else {
        tracing::debug!(%method, path = uri.path(), "Unsupported method");
        return not_found();
    };
    let Some(route) = operation_name(uri.path()) else {
        return not_found();
    };

    tracing::debug!(%method, route, "Dispatching");

    let outcome = match class {
        MethodClass::Read => {
            let args = match query {
                Ok(Query(args)) => args,
                Err(rejection) => return invalid_input(rejection.body_text()),
            };
            routes.run_query(route, args)
        }
        MethodClass::Write => {
            if !routes.contains(Namespace::Mutation, route) {
                return not_found();
            }
            let input = if body.is_empty() {
                Value::Null
            } else {
                match serde_json::from_slice(&body) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(route, "Malformed request body: {e}");
                        return invalid_input(e);
                    }
                }
            };
            routes.run_mutation(route, input)
        }
    };

    outcome.map_or_else(not_found, |outcome| reply(route, outcome))
}
