use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// File name of the settings document inside the data directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Organizer-facing settings, persisted wholesale as one flat JSON document.
///
/// Every field carries a default; a document missing any key (including the
/// empty document) deserializes to the default for that key, so reads always
/// see the merged whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoothSettings {
    /// Countdown before recording starts, in seconds
    pub countdown_duration: u32,

    /// Recording ceiling, in seconds; capture is force-stopped when reached
    pub max_recording: u32,

    /// Audible warning cue near the end of a recording
    pub beep: Beep,

    /// Locale code for the UI catalog
    pub language: String,

    /// Theme identifier
    pub theme: String,

    /// Record-button placement on the nine-cell grid
    pub button_position: ButtonPosition,

    /// Optional per-event color overrides on top of the theme
    pub custom_colors: Option<CustomColors>,

    /// PIN gating the admin surface
    pub pin: String,

    /// Display text for variant builds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_position: Option<String>,
}

impl Default for BoothSettings {
    fn default() -> Self {
        Self {
            countdown_duration: 5,
            max_recording: 600,
            beep: Beep::On,
            language: "fr".to_string(),
            theme: "mariage-classique".to_string(),
            button_position: ButtonPosition::BottomCenter,
            custom_colors: None,
            pin: "2402".to_string(),
            title: None,
            subtitle: None,
            text_position: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Beep {
    On,
    Off,
}

impl Beep {
    pub fn is_on(self) -> bool {
        matches!(self, Beep::On)
    }
}

/// Nine-cell grid position for the record button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonPosition {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColors {
    pub bg_color: String,
    pub text_color: String,
    pub btn_color: String,
    pub accent_color: String,
}

/// Persists the settings document under a fixed path.
///
/// Admin screens always resave the merged whole, so there is no field-level
/// write path; `save` replaces the document atomically.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    /// Load the settings document; a missing or unreadable document yields
    /// every default value.
    pub async fn load(&self) -> BoothSettings {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(settings) => {
                    debug!("Settings loaded from {}", self.path.display());
                    settings
                }
                Err(e) => {
                    warn!(
                        "Settings document at {} is malformed ({}), using defaults",
                        self.path.display(),
                        e
                    );
                    BoothSettings::default()
                }
            },
            Err(_) => {
                debug!(
                    "No settings document at {}, using defaults",
                    self.path.display()
                );
                BoothSettings::default()
            }
        }
    }

    /// Replace the settings document wholesale. Written to a temporary file
    /// first and renamed into place so a crash never leaves a torn document.
    pub async fn save(&self, settings: &BoothSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;

        info!("Settings saved to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
