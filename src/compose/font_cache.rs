use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use rusttype::Font;

/// Resolved font handle. rusttype fonts scale at draw time, so one parsed
/// font serves every field size.
#[derive(Clone)]
pub enum LoadedFont {
    TrueType(Arc<Font<'static>>),
    /// Minimal 5x7 bitmap fallback used when no candidate font loads.
    BuiltIn,
}

fn fonts_dir() -> PathBuf {
    if let Ok(p) = std::env::var("ADGEN_FONTS_DIR") {
        return PathBuf::from(p);
    }
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.join("assets").join("fonts")
}

fn default_candidates() -> Vec<PathBuf> {
    let dir = fonts_dir();
    vec![
        dir.join("Inter-Bold.ttf"),
        dir.join("Inter-Regular.ttf"),
        PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
        PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
    ]
}

/// Ordered-candidate font loader with memoization. The first candidate that
/// reads and parses wins; later calls reuse the cached handle.
pub struct FontCache {
    candidates: Vec<PathBuf>,
    resolved: Mutex<Option<LoadedFont>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::with_candidates(default_candidates())
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            resolved: Mutex::new(None),
        }
    }

    pub fn get(&self) -> LoadedFont {
        let mut slot = self.resolved.lock();
        if let Some(font) = slot.as_ref() {
            return font.clone();
        }

        let font = self
            .candidates
            .iter()
            .find_map(|path| load_truetype(path))
            .map(|f| LoadedFont::TrueType(Arc::new(f)))
            .unwrap_or(LoadedFont::BuiltIn);

        if matches!(font, LoadedFont::BuiltIn) {
            tracing::warn!("no candidate font could be loaded, using built-in bitmap font");
        }

        *slot = Some(font.clone());
        font
    }
}

impl Default for FontCache {
    fn default() -> Self {
        Self::new()
    }
}

fn load_truetype(path: &Path) -> Option<Font<'static>> {
    let bytes = std::fs::read(path).ok()?;
    Font::try_from_vec(bytes)
}
