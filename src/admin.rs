//! Admin surface: event settings, appearance, the event photo, and video
//! management. Reachable only after the session controller's PIN gate.

use crate::error::{BoothError, Result};
use crate::export::ExportEngine;
use crate::palette::extract_palette;
use crate::settings::{Beep, BoothSettings, ButtonPosition, CustomColors, SettingsStore};
use crate::store::BlobStore;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Storage slot for the uploaded event photo.
pub const EVENT_PHOTO_KEY: &str = "event-photo";

/// Longest edge kept when re-encoding an uploaded photo.
const MAX_PHOTO_EDGE: u32 = 1920;
const PHOTO_JPEG_QUALITY: u8 = 85;

/// Event-tab settings, saved wholesale.
#[derive(Debug, Clone)]
pub struct EventSettings {
    pub countdown_duration: u32,
    pub max_recording: u32,
    pub beep: Beep,
    pub language: String,
    pub button_position: ButtonPosition,
}

/// Stored-video metadata without the payload.
#[derive(Debug, Clone)]
pub struct VideoSummary {
    pub id: i64,
    pub filename: String,
    pub size: u64,
    pub timestamp: String,
}

pub struct AdminSurface {
    settings: SettingsStore,
    store: BlobStore,
    export: Arc<ExportEngine>,
}

impl AdminSurface {
    pub fn new(settings: SettingsStore, store: BlobStore, export: Arc<ExportEngine>) -> Self {
        Self {
            settings,
            store,
            export,
        }
    }

    pub async fn current_settings(&self) -> BoothSettings {
        self.settings.load().await
    }

    /// Merge the event tab into the settings document and resave it
    /// whole.
    pub async fn save_event_settings(&self, event: EventSettings) -> Result<BoothSettings> {
        let mut settings = self.settings.load().await;
        settings.countdown_duration = event.countdown_duration;
        settings.max_recording = event.max_recording;
        settings.beep = event.beep;
        settings.language = event.language;
        settings.button_position = event.button_position;
        self.settings.save(&settings).await?;
        info!("Event settings saved");
        Ok(settings)
    }

    /// Merge the appearance tab into the settings document and resave it
    /// whole.
    pub async fn save_appearance(
        &self,
        theme: String,
        custom_colors: Option<CustomColors>,
    ) -> Result<BoothSettings> {
        let mut settings = self.settings.load().await;
        settings.theme = theme;
        settings.custom_colors = custom_colors;
        self.settings.save(&settings).await?;
        info!("Appearance settings saved");
        Ok(settings)
    }

    pub async fn change_pin(&self, pin: String) -> Result<()> {
        let mut settings = self.settings.load().await;
        settings.pin = pin;
        self.settings.save(&settings).await?;
        info!("Admin PIN changed");
        Ok(())
    }

    /// Re-encode an uploaded photo to a bounded JPEG and store it under
    /// the event-photo slot. Oversized camera rolls stay out of the
    /// store.
    pub async fn upload_event_photo(&self, data: Vec<u8>) -> Result<()> {
        let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let img = image::load_from_memory(&data)
                .map_err(|e| BoothError::component("admin", format!("unreadable image: {}", e)))?;

            let (width, height) = img.dimensions();
            let img = if width.max(height) > MAX_PHOTO_EDGE {
                debug!(
                    "Downscaling event photo from {}x{} to fit {}px",
                    width, height, MAX_PHOTO_EDGE
                );
                img.resize(MAX_PHOTO_EDGE, MAX_PHOTO_EDGE, FilterType::Triangle)
            } else {
                img
            };

            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, PHOTO_JPEG_QUALITY);
            encoder
                .encode_image(&img.to_rgb8())
                .map_err(|e| BoothError::component("admin", format!("jpeg encode: {}", e)))?;
            Ok(out)
        })
        .await
        .map_err(|e| BoothError::component("admin", format!("image task failed: {}", e)))??;

        self.store.save_image(EVENT_PHOTO_KEY, encoded).await?;
        info!("Event photo stored");
        Ok(())
    }

    pub async fn event_photo(&self) -> Result<Option<Vec<u8>>> {
        self.store.get_image(EVENT_PHOTO_KEY).await
    }

    pub async fn delete_event_photo(&self) -> Result<()> {
        self.store.delete_image(EVENT_PHOTO_KEY).await?;
        info!("Event photo deleted");
        Ok(())
    }

    /// Build a theme palette from the stored event photo. `None` when no
    /// photo has been uploaded.
    pub async fn extract_theme_colors(&self) -> Result<Option<CustomColors>> {
        let Some(data) = self.store.get_image(EVENT_PHOTO_KEY).await? else {
            return Ok(None);
        };

        let colors = tokio::task::spawn_blocking(move || -> Result<CustomColors> {
            let img = image::load_from_memory(&data)
                .map_err(|e| BoothError::component("admin", format!("unreadable image: {}", e)))?;
            Ok(extract_palette(&img))
        })
        .await
        .map_err(|e| BoothError::component("admin", format!("palette task failed: {}", e)))??;

        Ok(Some(colors))
    }

    pub async fn videos(&self) -> Result<Vec<VideoSummary>> {
        let videos = self.store.list_videos().await?;
        Ok(videos
            .into_iter()
            .map(|v| VideoSummary {
                id: v.id,
                filename: v.filename,
                size: v.blob.len() as u64,
                timestamp: v.timestamp,
            })
            .collect())
    }

    /// Full record including the payload, for single-video download.
    pub async fn video(&self, id: i64) -> Result<Option<crate::store::VideoRecord>> {
        self.store.video(id).await
    }

    pub async fn delete_video(&self, id: i64) -> Result<()> {
        self.store.delete_video(id).await?;
        info!("Video {} deleted", id);
        Ok(())
    }

    pub async fn clear_all_videos(&self) -> Result<()> {
        self.store.clear_all_videos().await?;
        info!("All videos deleted");
        Ok(())
    }

    /// Package every stored recording; returns the archive paths.
    pub async fn export_videos(&self) -> Result<Vec<PathBuf>> {
        self.export.export_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    async fn admin_with(dir: &std::path::Path) -> AdminSurface {
        let store = BlobStore::open(dir).await.unwrap();
        let settings = SettingsStore::new(dir);
        let bus = Arc::new(EventBus::new(64));
        let export = Arc::new(ExportEngine::new(
            store.clone(),
            dir.join("exports"),
            "booth-videos",
            bus,
        ));
        AdminSurface::new(settings, store, export)
    }

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([180, 40, 40]));
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, 90);
        encoder.encode_image(&img).unwrap();
        out
    }

    #[tokio::test]
    async fn test_event_settings_resave_preserves_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let admin = admin_with(dir.path()).await;

        admin
            .save_appearance("neon".to_string(), None)
            .await
            .unwrap();
        let saved = admin
            .save_event_settings(EventSettings {
                countdown_duration: 10,
                max_recording: 120,
                beep: Beep::Off,
                language: "en".to_string(),
                button_position: ButtonPosition::TopLeft,
            })
            .await
            .unwrap();

        assert_eq!(saved.countdown_duration, 10);
        assert_eq!(saved.theme, "neon", "appearance survives event resave");

        let reloaded = admin.current_settings().await;
        assert_eq!(reloaded.max_recording, 120);
        assert_eq!(reloaded.beep, Beep::Off);
    }

    #[tokio::test]
    async fn test_photo_upload_reencodes_and_bounds_size() {
        let dir = tempfile::tempdir().unwrap();
        let admin = admin_with(dir.path()).await;

        admin
            .upload_event_photo(sample_jpeg(4000, 2000))
            .await
            .unwrap();

        let stored = admin.event_photo().await.unwrap().unwrap();
        let img = image::load_from_memory(&stored).unwrap();
        let (width, height) = img.dimensions();
        assert!(width.max(height) <= MAX_PHOTO_EDGE);

        admin.delete_event_photo().await.unwrap();
        assert!(admin.event_photo().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_small_photo_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let admin = admin_with(dir.path()).await;

        admin
            .upload_event_photo(sample_jpeg(800, 600))
            .await
            .unwrap();

        let stored = admin.event_photo().await.unwrap().unwrap();
        let img = image::load_from_memory(&stored).unwrap();
        assert_eq!(img.dimensions(), (800, 600));
    }

    #[tokio::test]
    async fn test_garbage_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let admin = admin_with(dir.path()).await;

        let err = admin
            .upload_event_photo(b"definitely not an image".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, BoothError::Component { .. }));
        assert!(admin.event_photo().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_palette_requires_a_photo() {
        let dir = tempfile::tempdir().unwrap();
        let admin = admin_with(dir.path()).await;

        assert!(admin.extract_theme_colors().await.unwrap().is_none());

        admin
            .upload_event_photo(sample_jpeg(200, 200))
            .await
            .unwrap();
        let colors = admin.extract_theme_colors().await.unwrap().unwrap();
        assert!(colors.bg_color.starts_with('#'));
        assert_eq!(colors.bg_color.len(), 7);
    }

    #[tokio::test]
    async fn test_video_management() {
        let dir = tempfile::tempdir().unwrap();
        let admin = admin_with(dir.path()).await;
        let store = BlobStore::open(dir.path()).await.unwrap();

        let first = store.save_video(vec![1u8; 10]).await.unwrap();
        store.save_video(vec![2u8; 20]).await.unwrap();

        let videos = admin.videos().await.unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].size, 10);

        let full = admin.video(first).await.unwrap().unwrap();
        assert_eq!(full.blob, vec![1u8; 10]);
        assert!(admin.video(9999).await.unwrap().is_none());

        admin.delete_video(first).await.unwrap();
        assert_eq!(admin.videos().await.unwrap().len(), 1);

        admin.clear_all_videos().await.unwrap();
        assert!(admin.videos().await.unwrap().is_empty());
    }
}
