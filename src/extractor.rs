//! Extraction gateway: product cut-out + ad copy from an uploaded image.
//!
//! Two backends behind one `extract` call: the remote extraction service
//! (pro model first, free model as fallback, failures aggregated) and a
//! deterministic local mock used when no API key is configured or mock mode
//! is requested (center crop + fixed placeholder text).

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use image::RgbaImage;
use serde::Deserialize;
use thiserror::Error;

use crate::compose::soften_alpha_edges;
use crate::util;

pub const DEFAULT_BASE_URL: &str = "https://api.nano-banana.ai";
pub const DEFAULT_PRO_MODEL: &str = "nano-banana-pro";
pub const DEFAULT_FREE_MODEL: &str = "nano-banana-lite";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Response keys that may carry the cut-out image, in probe order.
const PRODUCT_IMAGE_KEYS: [&str; 4] = [
    "product_cutout_png",
    "product_cutout_base64",
    "product_image_base64",
    "product_image",
];

/// (normalized key, response key). The spanish/english rename is intentional.
const TEXT_KEYS: [(&str, &str); 4] = [
    ("product_name", "product_name"),
    ("price", "price"),
    ("spanish_copy", "spanish"),
    ("english_copy", "english"),
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid input image: {0}")]
    InvalidImage(String),

    #[error("all extraction models failed: {0}")]
    AllModelsFailed(String),

    #[error("extraction api error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("http: {0}")]
    Http(String),

    #[error("malformed extraction response: {0}")]
    Parse(String),
}

/// Output contract of one extraction call: a transparent product image plus
/// the four normalized text fields. Owned by the caller; never mutated here.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub product_image: RgbaImage,
    pub text: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub pro_model: String,
    pub free_model: String,
    pub mock_mode: bool,
    pub timeout: Duration,
}

/// Optional secrets file; any present value takes precedence over the
/// environment.
#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    api_key: Option<String>,
    base_url: Option<String>,
    pro_model: Option<String>,
    free_model: Option<String>,
    mock_mode: Option<bool>,
}

fn load_secrets() -> SecretsFile {
    let path = std::env::var("ADGEN_SECRETS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/secrets.json"));
    match std::fs::read_to_string(&path) {
        // broken JSON is treated as an absent file
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => SecretsFile::default(),
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

impl ExtractorConfig {
    pub fn from_env() -> Self {
        let secrets = load_secrets();

        let api_key = secrets.api_key.or_else(|| env_var("ADGEN_API_KEY"));
        let base_url = secrets
            .base_url
            .or_else(|| env_var("ADGEN_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let pro_model = secrets
            .pro_model
            .or_else(|| env_var("ADGEN_PRO_MODEL"))
            .unwrap_or_else(|| DEFAULT_PRO_MODEL.to_string());
        let free_model = secrets
            .free_model
            .or_else(|| env_var("ADGEN_FREE_MODEL"))
            .unwrap_or_else(|| DEFAULT_FREE_MODEL.to_string());

        let env_mock = matches!(
            env_var("ADGEN_MOCK_MODE")
                .map(|s| s.to_ascii_lowercase())
                .as_deref(),
            Some("1") | Some("true") | Some("yes")
        );
        let mock_mode = secrets.mock_mode.unwrap_or(false) || env_mock;

        let timeout = env_var("ADGEN_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            pro_model,
            free_model,
            mock_mode,
            timeout,
        }
    }
}

pub struct Extractor {
    http: reqwest::Client,
    cfg: ExtractorConfig,
}

impl Extractor {
    pub fn new(http: reqwest::Client, cfg: ExtractorConfig) -> Self {
        Self { http, cfg }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }

    pub async fn extract(&self, image_bytes: &[u8]) -> Result<Extraction, ExtractError> {
        if self.cfg.mock_mode || self.cfg.api_key.is_none() {
            tracing::warn!("extractor in mock mode; configure an API key for production accuracy");
            return mock_extract(image_bytes);
        }

        let mut errors = Vec::new();
        for model in [&self.cfg.pro_model, &self.cfg.free_model] {
            if model.is_empty() {
                continue;
            }
            match self.invoke_model(model, image_bytes).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "extraction model failed");
                    errors.push(format!("{model}: {e}"));
                }
            }
        }
        Err(ExtractError::AllModelsFailed(errors.join("; ")))
    }

    async fn invoke_model(&self, model: &str, image_bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let url = format!("{}/v1/extract", self.cfg.base_url);
        let payload = serde_json::json!({
            "model": model,
            "image_base64": util::b64_encode(image_bytes),
            "tasks": ["product_cutout", "ocr"],
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.cfg.api_key.as_deref().unwrap_or_default())
            .timeout(self.cfg.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExtractError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Api { status, body });
        }

        let body = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExtractError::Http(e.to_string()))?;
        parse_response(&body, image_bytes)
    }
}

/// Legacy response shapes for one text field: a plain string, or an object
/// carrying the value under `content` or `text`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextValue {
    Plain(String),
    Rich {
        content: Option<String>,
        text: Option<String>,
    },
}

impl TextValue {
    fn into_string(self) -> String {
        match self {
            TextValue::Plain(s) => s,
            TextValue::Rich { content, text } => content
                .filter(|s| !s.is_empty())
                .or(text.filter(|s| !s.is_empty()))
                .unwrap_or_default(),
        }
    }
}

fn pluck_text(fields: &serde_json::Map<String, serde_json::Value>, key: &str) -> String {
    fields
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value::<TextValue>(v).ok())
        .map(TextValue::into_string)
        .unwrap_or_default()
}

pub fn parse_response(payload: &serde_json::Value, fallback_bytes: &[u8]) -> Result<Extraction, ExtractError> {
    // envelope {data: {...}} or a flat object
    let data = payload
        .get("data")
        .filter(|v| v.is_object())
        .unwrap_or(payload);

    // no usable cut-out: degrade to the whole uploaded image
    let product_bytes = extract_product_bytes(data).unwrap_or_else(|| fallback_bytes.to_vec());
    let product = image::load_from_memory(&product_bytes)
        .map_err(|e| ExtractError::Parse(format!("product image: {e}")))?
        .to_rgba8();

    let text_fields = match data.get("text") {
        None | Some(serde_json::Value::Null) => serde_json::Map::new(),
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(ExtractError::Parse(format!(
                "text must be an object, got {other}"
            )))
        }
    };

    let mut text = BTreeMap::new();
    for (normalized, response_key) in TEXT_KEYS {
        text.insert(normalized.to_string(), pluck_text(&text_fields, response_key));
    }

    Ok(Extraction {
        product_image: soften_alpha_edges(&product),
        text,
    })
}

fn extract_product_bytes(data: &serde_json::Value) -> Option<Vec<u8>> {
    for key in PRODUCT_IMAGE_KEYS {
        let Some(value) = data.get(key) else {
            continue;
        };
        let Some(s) = value.as_str() else {
            continue;
        };
        // undecodable values fall through to the next key
        if let Some(bytes) = util::b64_decode(s) {
            return Some(bytes);
        }
    }
    None
}

fn mock_extract(image_bytes: &[u8]) -> Result<Extraction, ExtractError> {
    let source = image::load_from_memory(image_bytes)
        .map_err(|e| ExtractError::InvalidImage(e.to_string()))?
        .to_rgba8();
    let (w, h) = source.dimensions();
    let left = (w as f64 * 0.1) as u32;
    let top = (h as f64 * 0.1) as u32;
    let right = (w as f64 * 0.9) as u32;
    let bottom = (h as f64 * 0.9) as u32;
    let crop = image::imageops::crop_imm(
        &source,
        left,
        top,
        right.saturating_sub(left).max(1),
        bottom.saturating_sub(top).max(1),
    )
    .to_image();

    Ok(Extraction {
        product_image: soften_alpha_edges(&crop),
        text: placeholder_text(),
    })
}

pub fn placeholder_text() -> BTreeMap<String, String> {
    [
        ("product_name", "Sample Product"),
        ("price", "$9.99"),
        ("spanish_copy", "Oferta limitada"),
        ("english_copy", "Limited time offer"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::encode_png_rgba;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([120, 30, 60, 255]));
        encode_png_rgba(&img).unwrap()
    }

    fn mock_client() -> Extractor {
        Extractor::new(
            reqwest::Client::new(),
            ExtractorConfig {
                api_key: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                pro_model: DEFAULT_PRO_MODEL.to_string(),
                free_model: DEFAULT_FREE_MODEL.to_string(),
                mock_mode: true,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn mock_extract_crops_central_eighty_percent() {
        let extraction = mock_client().extract(&png_bytes(200, 100)).await.unwrap();
        assert_eq!(extraction.product_image.dimensions(), (160, 80));
        assert_eq!(extraction.text, placeholder_text());
    }

    #[tokio::test]
    async fn absent_api_key_also_degrades_to_mock() {
        let client = Extractor::new(
            reqwest::Client::new(),
            ExtractorConfig {
                api_key: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                pro_model: DEFAULT_PRO_MODEL.to_string(),
                free_model: DEFAULT_FREE_MODEL.to_string(),
                mock_mode: false,
                timeout: Duration::from_secs(5),
            },
        );
        let extraction = client.extract(&png_bytes(100, 100)).await.unwrap();
        assert_eq!(extraction.product_image.dimensions(), (80, 80));
    }

    #[tokio::test]
    async fn mock_extract_rejects_undecodable_input() {
        let err = mock_client().extract(b"not an image").await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidImage(_)));
    }

    #[test]
    fn placeholder_constants_match_contract() {
        let text = placeholder_text();
        assert_eq!(text["product_name"], "Sample Product");
        assert_eq!(text["price"], "$9.99");
        assert_eq!(text["spanish_copy"], "Oferta limitada");
        assert_eq!(text["english_copy"], "Limited time offer");
    }

    #[test]
    fn normalizes_plain_string_text_values() {
        let payload = serde_json::json!({
            "data": {
                "product_cutout_png": util::b64_encode(&png_bytes(10, 10)),
                "text": {"english": "Hi", "spanish": "Hola"}
            }
        });
        let extraction = parse_response(&payload, &png_bytes(4, 4)).unwrap();
        assert_eq!(extraction.text["english_copy"], "Hi");
        assert_eq!(extraction.text["spanish_copy"], "Hola");
        assert_eq!(extraction.text["product_name"], "");
        assert_eq!(extraction.text["price"], "");
    }

    #[test]
    fn normalizes_rich_object_text_values() {
        let payload = serde_json::json!({
            "text": {
                "english": {"content": "Hi"},
                "spanish": {"text": "Hola"},
                "product_name": {"content": "", "text": "Widget"}
            },
            "product_image": util::b64_encode(&png_bytes(10, 10)),
        });
        let extraction = parse_response(&payload, &png_bytes(4, 4)).unwrap();
        assert_eq!(extraction.text["english_copy"], "Hi");
        assert_eq!(extraction.text["spanish_copy"], "Hola");
        assert_eq!(extraction.text["product_name"], "Widget");
    }

    #[test]
    fn product_image_accepts_data_uri_form() {
        let b64 = util::b64_encode(&png_bytes(12, 8));
        let payload = serde_json::json!({
            "data": {"product_cutout_base64": format!("data:image/png;base64,{b64}")}
        });
        let extraction = parse_response(&payload, &png_bytes(4, 4)).unwrap();
        assert_eq!(extraction.product_image.dimensions(), (12, 8));
    }

    #[test]
    fn undecodable_image_keys_are_skipped_in_order() {
        let payload = serde_json::json!({
            "data": {
                "product_cutout_png": "!!!not base64!!!",
                "product_image_base64": util::b64_encode(&png_bytes(6, 6))
            }
        });
        let extraction = parse_response(&payload, &png_bytes(4, 4)).unwrap();
        assert_eq!(extraction.product_image.dimensions(), (6, 6));
    }

    #[test]
    fn missing_product_image_reuses_uploaded_bytes() {
        let payload = serde_json::json!({"data": {"text": {}}});
        let extraction = parse_response(&payload, &png_bytes(30, 20)).unwrap();
        assert_eq!(extraction.product_image.dimensions(), (30, 20));
    }

    #[test]
    fn non_object_text_is_a_parse_error() {
        let payload = serde_json::json!({
            "data": {
                "product_image": util::b64_encode(&png_bytes(4, 4)),
                "text": ["not", "an", "object"]
            }
        });
        let err = parse_response(&payload, &png_bytes(4, 4)).unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn garbage_product_bytes_are_a_parse_error() {
        let payload = serde_json::json!({"data": {}});
        let err = parse_response(&payload, b"not an image").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }
}
