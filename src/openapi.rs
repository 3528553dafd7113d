use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health,
        api::list_templates,
        api::extract,
        api::render,
    ),
    components(
        schemas(
            api::ExtractRequest,
            api::ExtractResponse,
            api::RenderRequest,
            api::TemplateSummary,
            api::HealthResponse
        )
    ),
    tags(
        (name = "adgen", description = "adgen Rust backend API")
    )
)]
pub struct ApiDoc;
