use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Policy Portal Back.
#[openapi(
    paths(crate::routes::health::healthcheck),
    components(schemas(
        crate::dto::health::HealthResponse,
        crate::lifecycle::ConnectionState,
    )),
    tags((name = "health", description = "Health check endpoints"))
)]
pub struct ApiDoc;
