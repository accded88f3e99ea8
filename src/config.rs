use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Process-level configuration: storage locations and capture tunables.
///
/// Organizer-facing settings (durations, theme, PIN, ...) live in the
/// persisted settings document instead; see [`crate::settings`].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothConfig {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the blob database and the settings document
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory archive parts are written to
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// Directory containing `<lang>.json` locale catalogs
    #[serde(default = "default_locales_dir")]
    pub locales_dir: String,

    /// Base name for export archives (`<base>.tar.gz`, `<base>-partN.tar.gz`)
    #[serde(default = "default_export_base_name")]
    pub export_base_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Preferred stream resolution (width, height)
    #[serde(default = "default_ideal_resolution")]
    pub ideal_resolution: (u32, u32),

    /// Fallback resolution tried once when the preferred one fails
    #[serde(default = "default_fallback_resolution")]
    pub fallback_resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_capture_fps")]
    pub fps: u32,

    /// Center-crop zoom factor countering wide-angle distortion
    #[serde(default = "default_zoom_factor")]
    pub zoom_factor: f64,

    /// Whether the center-crop correction is requested at all
    #[serde(default = "default_crop_enabled")]
    pub crop_enabled: bool,

    /// Remaining seconds at which the on-screen countdown becomes visible
    #[serde(default = "default_countdown_visible_seconds")]
    pub countdown_visible_seconds: u32,

    /// Remaining seconds at which the urgent warning fires (exactly once)
    #[serde(default = "default_urgent_warning_seconds")]
    pub urgent_warning_seconds: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// How long the confirmation screen stays up after a saved recording
    #[serde(default = "default_confirmation_seconds")]
    pub confirmation_seconds: u32,

    /// Number of taps opening the admin entry
    #[serde(default = "default_secret_taps")]
    pub secret_taps: u32,

    /// Rolling window for the secret tap sequence, in milliseconds
    #[serde(default = "default_secret_tap_window_ms")]
    pub secret_tap_window_ms: u64,
}

impl BoothConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("photobooth.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("storage.data_dir", default_data_dir())?
            .set_default("storage.export_dir", default_export_dir())?
            .set_default("storage.locales_dir", default_locales_dir())?
            .set_default("storage.export_base_name", default_export_base_name())?
            .set_default(
                "capture.ideal_resolution",
                vec![
                    default_ideal_resolution().0 as i64,
                    default_ideal_resolution().1 as i64,
                ],
            )?
            .set_default(
                "capture.fallback_resolution",
                vec![
                    default_fallback_resolution().0 as i64,
                    default_fallback_resolution().1 as i64,
                ],
            )?
            .set_default("capture.fps", default_capture_fps() as i64)?
            .set_default("capture.zoom_factor", default_zoom_factor())?
            .set_default("capture.crop_enabled", default_crop_enabled())?
            .set_default(
                "capture.countdown_visible_seconds",
                default_countdown_visible_seconds() as i64,
            )?
            .set_default(
                "capture.urgent_warning_seconds",
                default_urgent_warning_seconds() as i64,
            )?
            .set_default(
                "session.confirmation_seconds",
                default_confirmation_seconds() as i64,
            )?
            .set_default("session.secret_taps", default_secret_taps() as i64)?
            .set_default(
                "session.secret_tap_window_ms",
                default_secret_tap_window_ms() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("PHOTOBOOTH").separator("_"))
            .build()?;

        let config: BoothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.ideal_resolution.0 == 0 || self.capture.ideal_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Capture ideal_resolution must be greater than 0".to_string(),
            ));
        }

        if self.capture.fallback_resolution.0 == 0 || self.capture.fallback_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Capture fallback_resolution must be greater than 0".to_string(),
            ));
        }

        if self.capture.fps == 0 {
            return Err(ConfigError::Message(
                "Capture fps must be greater than 0".to_string(),
            ));
        }

        if self.capture.zoom_factor < 1.0 {
            return Err(ConfigError::Message(
                "Capture zoom_factor must be at least 1.0".to_string(),
            ));
        }

        if self.capture.urgent_warning_seconds > self.capture.countdown_visible_seconds {
            return Err(ConfigError::Message(
                "urgent_warning_seconds must not exceed countdown_visible_seconds".to_string(),
            ));
        }

        if self.session.secret_taps < 2 {
            return Err(ConfigError::Message(
                "Session secret_taps must be at least 2".to_string(),
            ));
        }

        if self.storage.data_dir.is_empty() || self.storage.export_dir.is_empty() {
            return Err(ConfigError::Message(
                "Storage directories must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: default_data_dir(),
                export_dir: default_export_dir(),
                locales_dir: default_locales_dir(),
                export_base_name: default_export_base_name(),
            },
            capture: CaptureConfig {
                ideal_resolution: default_ideal_resolution(),
                fallback_resolution: default_fallback_resolution(),
                fps: default_capture_fps(),
                zoom_factor: default_zoom_factor(),
                crop_enabled: default_crop_enabled(),
                countdown_visible_seconds: default_countdown_visible_seconds(),
                urgent_warning_seconds: default_urgent_warning_seconds(),
            },
            session: SessionConfig {
                confirmation_seconds: default_confirmation_seconds(),
                secret_taps: default_secret_taps(),
                secret_tap_window_ms: default_secret_tap_window_ms(),
            },
        }
    }
}

// Default value functions
fn default_data_dir() -> String {
    "./booth-data".to_string()
}
fn default_export_dir() -> String {
    "./exports".to_string()
}
fn default_locales_dir() -> String {
    "./locales".to_string()
}
fn default_export_base_name() -> String {
    "photobooth-videos".to_string()
}

fn default_ideal_resolution() -> (u32, u32) {
    (1920, 1080)
}
fn default_fallback_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_capture_fps() -> u32 {
    30
}
fn default_zoom_factor() -> f64 {
    1.5
}
fn default_crop_enabled() -> bool {
    true
}
fn default_countdown_visible_seconds() -> u32 {
    60
}
fn default_urgent_warning_seconds() -> u32 {
    10
}

fn default_confirmation_seconds() -> u32 {
    3
}
fn default_secret_taps() -> u32 {
    5
}
fn default_secret_tap_window_ms() -> u64 {
    2000
}
