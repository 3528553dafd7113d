//! Template registry: declarative store templates loaded once at startup.
//!
//! The config document is a JSON object with a top-level `stores` array:
//!
//! ```json
//! {
//!   "stores": [
//!     {
//!       "id": "skyline",
//!       "name": "Skyline Grocers",
//!       "template_path": "assets/templates/skyline_1080x1920.png",
//!       "product_area": {"x": 140, "y": 520, "width": 800, "height": 760},
//!       "text_fields": {
//!         "price": {"x": 120, "y": 1380, "size": 96, "color": "#D7263D"}
//!       }
//!     }
//!   ]
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use image::RgbaImage;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template config not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("failed to read template config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed template config at {path}: {source}")]
    ConfigMalformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("template image missing: {0}")]
    ImageNotFound(PathBuf),

    #[error("failed to decode template image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },
}

/// Product placement rectangle, in pixel space of the background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Rect {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// A named, positioned, styled text slot on a template.
#[derive(Debug, Clone, Deserialize)]
pub struct TextFieldSpec {
    pub x: i64,
    pub y: i64,
    pub size: u32,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct TemplateSpec {
    pub id: String,
    pub name: String,
    pub template_path: PathBuf,
    pub product_area: Rect,
    pub text_fields: BTreeMap<String, TextFieldSpec>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: String,
    name: Option<String>,
    template_path: PathBuf,
    #[serde(default)]
    product_area: Rect,
    #[serde(default)]
    text_fields: BTreeMap<String, TextFieldSpec>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    stores: Vec<RawEntry>,
}

/// Read-only mapping from template id to [`TemplateSpec`], in file order.
#[derive(Debug)]
pub struct TemplateRegistry {
    templates: Vec<TemplateSpec>,
    index: HashMap<String, usize>,
}

impl TemplateRegistry {
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = config_path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::ConfigNotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(TemplateError::ConfigRead {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let config: RawConfig =
            serde_json::from_str(&raw).map_err(|e| TemplateError::ConfigMalformed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut templates: Vec<TemplateSpec> = Vec::with_capacity(config.stores.len());
        let mut index = HashMap::new();
        for entry in config.stores {
            let spec = TemplateSpec {
                name: entry
                    .name
                    .unwrap_or_else(|| entry.id.clone())
                    .trim()
                    .to_string(),
                id: entry.id,
                template_path: entry.template_path,
                product_area: entry.product_area,
                text_fields: entry.text_fields,
            };
            match index.get(&spec.id) {
                // duplicate id: last entry wins, keeping the original slot
                Some(&slot) => templates[slot] = spec,
                None => {
                    index.insert(spec.id.clone(), templates.len());
                    templates.push(spec);
                }
            }
        }

        Ok(Self { templates, index })
    }

    /// All templates, in config file order.
    pub fn list(&self) -> &[TemplateSpec] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Result<&TemplateSpec, TemplateError> {
        self.index
            .get(id)
            .map(|&slot| &self.templates[slot])
            .ok_or_else(|| TemplateError::UnknownTemplate(id.to_string()))
    }

    /// Open and decode the background image referenced by a template,
    /// normalized to RGBA.
    pub fn load_background(&self, id: &str) -> Result<RgbaImage, TemplateError> {
        let spec = self.get(id)?;
        if !spec.template_path.exists() {
            return Err(TemplateError::ImageNotFound(spec.template_path.clone()));
        }
        let img = image::open(&spec.template_path).map_err(|e| TemplateError::ImageDecode {
            path: spec.template_path.clone(),
            reason: e.to_string(),
        })?;
        Ok(img.to_rgba8())
    }
}
