//! Flat-catalog localisation for the booth UI.
//!
//! Catalogs live as `<lang>.json` files of string-to-string pairs under
//! the locales directory. A failed catalog load keeps the previous one so
//! a bad language switch never blanks the UI.

use crate::error::{BoothError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const RTL_LANGUAGES: &[&str] = &["ar", "he", "fa", "ur"];

pub struct I18n {
    locales_dir: PathBuf,
    language: RwLock<String>,
    catalog: RwLock<HashMap<String, String>>,
}

impl I18n {
    pub fn new<P: AsRef<Path>>(locales_dir: P) -> Self {
        Self {
            locales_dir: locales_dir.as_ref().to_path_buf(),
            language: RwLock::new(String::new()),
            catalog: RwLock::new(HashMap::new()),
        }
    }

    pub fn language(&self) -> String {
        self.language.read().clone()
    }

    pub fn is_rtl(&self) -> bool {
        RTL_LANGUAGES.contains(&self.language.read().as_str())
    }

    /// Load the catalog for a language and make it current.
    pub async fn load(&self, lang: &str) -> Result<()> {
        let path = self.locales_dir.join(format!("{}.json", lang));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            BoothError::component("i18n", format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog: HashMap<String, String> = serde_json::from_str(&raw)?;

        info!("Loaded {} translations for '{}'", catalog.len(), lang);
        *self.catalog.write() = catalog;
        *self.language.write() = lang.to_string();
        Ok(())
    }

    /// Switch language, keeping the previous catalog when the new one
    /// cannot be loaded.
    pub async fn switch_to(&self, lang: &str) {
        if let Err(e) = self.load(lang).await {
            warn!("Keeping language '{}': {}", self.language(), e);
        }
    }

    /// Translate a key; unknown keys render as themselves so missing
    /// entries are visible instead of blank.
    pub fn get(&self, key: &str) -> String {
        self.catalog
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}
