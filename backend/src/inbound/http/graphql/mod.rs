//! GraphQL endpoint.
//!
//! ```text
//! POST /graphql {"query":"{ users { id posts { title } } }"}
//! ```
//!
//! Request-level failures (unparsable text, unknown fields, bad arguments)
//! are answered with 400 and the error payload. Anything that fails while
//! resolving a field is reported inside a 200 response's `errors` list.

mod document;

use actix_web::{post, web};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use utoipa::ToSchema;

use crate::domain::Error;
use crate::domain::graph::ExecutionResult;
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

pub use document::build_operation;

/// Request body for `POST /graphql`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// Query document text.
    #[schema(example = "{ users { id name } }")]
    pub query: String,
    /// Values for the variables the document declares.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub variables: Option<Map<String, Value>>,
    /// Operation to run when the document declares several.
    #[serde(default)]
    pub operation_name: Option<String>,
}

/// Execute a query or mutation.
#[utoipa::path(
    post,
    path = "/graphql",
    request_body = GraphqlRequest,
    responses(
        (
            status = 200,
            description = "Operation executed; field failures are listed in `errors`",
            body = ExecutionResult
        ),
        (status = 400, description = "Invalid request", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["graphql"],
    operation_id = "executeGraphql"
)]
#[post("/graphql")]
pub async fn graphql(
    state: web::Data<HttpState>,
    payload: web::Json<GraphqlRequest>,
) -> ApiResult<web::Json<ExecutionResult>> {
    let GraphqlRequest {
        query,
        variables,
        operation_name,
    } = payload.into_inner();
    let operation = build_operation(
        &query,
        operation_name.as_deref(),
        variables.unwrap_or_default(),
    )?;
    let result = state.executor.execute(&operation).await?;
    if !result.errors.is_empty() {
        debug!(errors = result.errors.len(), "operation completed with field errors");
    }
    Ok(web::Json(result))
}

#[cfg(test)]
mod tests;
