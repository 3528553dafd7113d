use std::{collections::BTreeMap, sync::Arc};

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    compose,
    extractor::ExtractError,
    template::TemplateError,
    util, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtractRequest {
    /// Uploaded ad image, base64 or data URI.
    pub image: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractResponse {
    /// Product cut-out as a PNG data URI (alpha preserved).
    pub product_image: String,
    pub text: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenderRequest {
    pub template_id: String,
    /// Product cut-out, base64 or data URI.
    pub product_image: String,
    #[serde(default)]
    pub text: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[utoipa::path(get, path = "/health", tag = "adgen", responses((status=200, body=HealthResponse)))]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok".into() })
}

#[utoipa::path(
    get,
    path = "/templates",
    tag = "adgen",
    responses((status=200, body=[TemplateSummary]))
)]
pub async fn list_templates(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let items: Vec<TemplateSummary> = st
        .registry
        .list()
        .iter()
        .map(|spec| TemplateSummary {
            id: spec.id.clone(),
            name: spec.name.clone(),
        })
        .collect();
    Json(items)
}

#[utoipa::path(
    post,
    path = "/extract",
    tag = "adgen",
    request_body = ExtractRequest,
    responses(
        (status=200, body=ExtractResponse),
        (status=400, description="Bad request"),
        (status=502, description="Extraction service failed")
    )
)]
pub async fn extract(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ExtractRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bytes = util::b64_decode(&req.image).ok_or((
        StatusCode::BAD_REQUEST,
        "image must be base64 or a data URI".to_string(),
    ))?;

    let extraction = st.extractor.extract(&bytes).await.map_err(map_extract_error)?;

    let png = compose::encode_png_rgba(&extraction.product_image)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ExtractResponse {
        product_image: util::png_data_uri(&png),
        text: extraction.text,
    }))
}

#[utoipa::path(
    post,
    path = "/render",
    tag = "adgen",
    request_body = RenderRequest,
    responses(
        (status=200, description="Rendered PNG", content_type="image/png"),
        (status=400, description="Bad request"),
        (status=404, description="Unknown template")
    )
)]
pub async fn render(
    State(st): State<Arc<AppState>>,
    Json(req): Json<RenderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let spec = st.registry.get(&req.template_id).map_err(map_template_error)?;
    let background = st
        .registry
        .load_background(&req.template_id)
        .map_err(map_template_error)?;

    let product_bytes = util::b64_decode(&req.product_image).ok_or((
        StatusCode::BAD_REQUEST,
        "product_image must be base64 or a data URI".to_string(),
    ))?;
    let product = image::load_from_memory(&product_bytes)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid product image: {e}")))?
        .to_rgba8();

    let canvas = st
        .compositor
        .render(spec, background, &product, &req.text)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let png = compose::encode_png(&canvas)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(([(axum::http::header::CONTENT_TYPE, "image/png")], png))
}

fn map_template_error(e: TemplateError) -> (StatusCode, String) {
    match e {
        TemplateError::UnknownTemplate(_) => (StatusCode::NOT_FOUND, e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn map_extract_error(e: ExtractError) -> (StatusCode, String) {
    match e {
        ExtractError::InvalidImage(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        ExtractError::AllModelsFailed(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
