//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] describes the HTTP surface: the GraphQL endpoint and the health
//! checks. The query language itself is not modelled in OpenAPI; only the
//! request and response envelopes are. Swagger UI serves it in debug builds.

use utoipa::OpenApi;

use crate::domain::graph::{ErrorExtensions, ExecutionResult, FieldError, PathSegment};
use crate::domain::{Error, ErrorCode};
use crate::inbound::http::graphql::GraphqlRequest;

/// OpenAPI document for the HTTP API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Postboard API",
        description = "Users and posts behind a batched GraphQL-style endpoint."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::graphql::graphql,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        GraphqlRequest,
        ExecutionResult,
        FieldError,
        ErrorExtensions,
        PathSegment,
        Error,
        ErrorCode
    )),
    tags(
        (name = "graphql", description = "Query and mutation execution"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    //! Tests verifying the generated OpenAPI document.

    use super::*;
    use rstest::rstest;
    use utoipa::openapi::RefOr;
    use utoipa::openapi::schema::Schema;

    fn assert_object_schema_has_field(schema: &RefOr<Schema>, field: &str) {
        match schema {
            RefOr::T(Schema::Object(obj)) => {
                assert!(
                    obj.properties.contains_key(field),
                    "schema should have field '{field}'"
                );
            }
            _ => panic!("expected Object schema"),
        }
    }

    #[rstest]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in ["/graphql", "/health/ready", "/health/live"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[rstest]
    #[case("GraphqlRequest", "query")]
    #[case("GraphqlRequest", "operationName")]
    #[case("ExecutionResult", "data")]
    #[case("FieldError", "path")]
    #[case("Error", "code")]
    fn envelope_schemas_expose_their_fields(#[case] name: &str, #[case] field: &str) {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        let schema = schemas.get(name).expect("schema registered");
        assert_object_schema_has_field(schema, field);
    }
}
