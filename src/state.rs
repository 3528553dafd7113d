use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::{
    compose::{font_cache::FontCache, Compositor},
    extractor::{Extractor, ExtractorConfig},
    template::{TemplateError, TemplateRegistry},
};

/// Process-scoped application state, constructed once at startup and shared
/// read-only across requests. No ambient globals: the registry, font cache
/// and remote client all live here.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TemplateRegistry>,
    pub extractor: Arc<Extractor>,
    pub compositor: Arc<Compositor>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl AppState {
    pub fn load() -> Result<Self, StateError> {
        let config_path = std::env::var("ADGEN_TEMPLATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/templates.json"));

        let registry = TemplateRegistry::load(&config_path)?;
        let extractor = Extractor::new(reqwest::Client::new(), ExtractorConfig::from_env());
        let compositor = Compositor::new(FontCache::new());

        Ok(Self {
            registry: Arc::new(registry),
            extractor: Arc::new(extractor),
            compositor: Arc::new(compositor),
        })
    }
}
